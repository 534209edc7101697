// Result orderings.

use std::cmp::Ordering;

use crate::result::FstResult;

/// Order results best first: accept priority ascending, then priority
/// paths element by element (lower wins, a prefix beats its extensions),
/// then production order.
///
/// Laziness of the accepting state is not consulted; see
/// [`compare_longest`] for an ordering that honors it.
pub fn compare_results<D>(x: &FstResult<D>, y: &FstResult<D>) -> Ordering {
    x.priority
        .cmp(&y.priority)
        .then_with(|| x.priority_path.cmp(&y.priority_path))
        .then_with(|| x.sequence_no.cmp(&y.sequence_no))
}

/// Order results for longest-match clients of deterministic automata:
/// accept priority ascending, then the longer match first (the shorter
/// one first when `x` ended in a lazy state), then [`compare_results`].
///
/// Pass it to [`Fst::transduce_with`](crate::Fst::transduce_with).
pub fn compare_longest<D>(x: &FstResult<D>, y: &FstResult<D>) -> Ordering {
    x.priority
        .cmp(&y.priority)
        .then_with(|| {
            let longer = y.end_index.cmp(&x.end_index);
            if x.is_lazy { longer.reverse() } else { longer }
        })
        .then_with(|| compare_results(x, y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::register::Registers;
    use machina_core::VariableBindings;

    fn result(priority: i32, path: &[i32], seq: usize) -> FstResult<()> {
        FstResult {
            accept_id: None,
            registers: Registers::new(0),
            output: None,
            bindings: VariableBindings::new(),
            priority,
            is_lazy: false,
            end_annotation: None,
            end_index: 0,
            priority_path: path.to_vec(),
            sequence_no: seq,
        }
    }

    #[test]
    fn accept_priority_first() {
        let a = result(-1, &[5], 1);
        let b = result(0, &[0], 0);
        assert_eq!(compare_results(&a, &b), Ordering::Less);
    }

    #[test]
    fn paths_compared_elementwise() {
        let a = result(0, &[0, 1, 0], 1);
        let b = result(0, &[0, 2], 0);
        assert_eq!(compare_results(&a, &b), Ordering::Less);
        let prefix = result(0, &[0, 1], 2);
        assert_eq!(compare_results(&prefix, &a), Ordering::Less);
    }

    #[test]
    fn sequence_breaks_ties() {
        let a = result(0, &[1], 3);
        let b = result(0, &[1], 4);
        assert_eq!(compare_results(&a, &b), Ordering::Less);
        let mut v = vec![b, a];
        v.sort_by(compare_results);
        assert_eq!(v[0].sequence_no(), 3);
    }

    #[test]
    fn longest_match_first_unless_lazy() {
        let mut short = result(0, &[0], 0);
        short.end_index = 1;
        let mut long = result(0, &[0, 0], 1);
        long.end_index = 2;
        assert_eq!(compare_longest(&long, &short), Ordering::Less);
        assert_eq!(compare_results(&long, &short), Ordering::Greater);

        short.is_lazy = true;
        long.is_lazy = true;
        assert_eq!(compare_longest(&short, &long), Ordering::Less);

        let mut preferred = result(-1, &[0], 2);
        preferred.end_index = 1;
        assert_eq!(compare_longest(&preferred, &long), Ordering::Less);
    }
}
