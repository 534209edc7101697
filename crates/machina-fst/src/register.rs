// Capture registers and the tag-map commands that write them.

use machina_core::Offset;

/// One capture endpoint.
///
/// A register is either absent (the tag did not take part in the
/// derivation) or holds an offset together with the side of the annotation
/// it was taken from. An absent register is different from a zero-length
/// capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Register {
    offset: Option<Offset>,
    is_start: bool,
}

impl Register {
    pub const ABSENT: Register = Register {
        offset: None,
        is_start: false,
    };

    pub fn at(offset: Offset, is_start: bool) -> Self {
        Self {
            offset: Some(offset),
            is_start,
        }
    }

    pub fn offset(&self) -> Option<Offset> {
        self.offset
    }

    pub fn is_start(&self) -> bool {
        self.is_start
    }

    pub fn is_present(&self) -> bool {
        self.offset.is_some()
    }
}

impl std::fmt::Display for Register {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.offset {
            None => write!(f, "-"),
            Some(o) if self.is_start => write!(f, "{o}s"),
            Some(o) => write!(f, "{o}e"),
        }
    }
}

/// Flat register bank: one row per tag, two endpoint columns per row.
///
/// Column 0 receives the "start side" value of a command and column 1 the
/// "end side" value. Equality and hashing are cell-wise, which is what the
/// nondeterministic search and result deduplication need.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct Registers {
    cells: Vec<Register>,
}

impl Registers {
    /// An all-absent bank with `tag_count` rows.
    pub fn new(tag_count: usize) -> Self {
        Self {
            cells: vec![Register::ABSENT; tag_count * 2],
        }
    }

    pub fn tag_count(&self) -> usize {
        self.cells.len() / 2
    }

    /// Register in row `tag`, column `side` (0 or 1).
    #[inline]
    pub fn get(&self, tag: usize, side: usize) -> Register {
        debug_assert!(side < 2);
        self.cells[tag * 2 + side]
    }

    #[inline]
    pub fn set(&mut self, tag: usize, start: Register, end: Register) {
        self.cells[tag * 2] = start;
        self.cells[tag * 2 + 1] = end;
    }

    #[inline]
    pub fn copy_row(&mut self, dest: usize, src: usize) {
        self.cells.copy_within(src * 2..src * 2 + 2, dest * 2);
    }

    /// Reset every register to absent.
    pub fn clear(&mut self) {
        self.cells.fill(Register::ABSENT);
    }

    pub fn rows(&self) -> impl Iterator<Item = (Register, Register)> + '_ {
        self.cells.chunks_exact(2).map(|c| (c[0], c[1]))
    }
}

impl Clone for Registers {
    fn clone(&self) -> Self {
        Self {
            cells: self.cells.clone(),
        }
    }

    fn clone_from(&mut self, source: &Self) {
        self.cells.clone_from(&source.cells);
    }
}

/// Where a [`TagMapCommand`] takes its value from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandSource {
    /// Install the current traversal position.
    CurrentPosition,
    /// Copy another register row.
    CopyFrom(usize),
}

/// Instruction writing one register row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TagMapCommand {
    pub dest: usize,
    pub src: CommandSource,
}

impl TagMapCommand {
    pub fn current_position(dest: usize) -> Self {
        Self {
            dest,
            src: CommandSource::CurrentPosition,
        }
    }

    pub fn copy(dest: usize, src: usize) -> Self {
        Self {
            dest,
            src: CommandSource::CopyFrom(src),
        }
    }

    /// Highest register row this command touches.
    pub(crate) fn max_row(&self) -> usize {
        match self.src {
            CommandSource::CurrentPosition => self.dest,
            CommandSource::CopyFrom(src) => self.dest.max(src),
        }
    }
}

/// Run `commands` against `bank` in order.
///
/// This is the only mutator of a register bank during traversal.
pub fn execute_commands(
    bank: &mut Registers,
    commands: &[TagMapCommand],
    start: Register,
    end: Register,
) {
    for cmd in commands {
        match cmd.src {
            CommandSource::CurrentPosition => bank.set(cmd.dest, start, end),
            CommandSource::CopyFrom(src) => bank.copy_row(cmd.dest, src),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_is_not_zero() {
        assert_ne!(Register::ABSENT, Register::at(0, true));
        assert_ne!(Register::at(0, true), Register::at(0, false));
        assert!(!Register::ABSENT.is_present());
    }

    #[test]
    fn current_position_writes_both_sides() {
        let mut bank = Registers::new(2);
        execute_commands(
            &mut bank,
            &[TagMapCommand::current_position(1)],
            Register::at(3, true),
            Register::at(2, false),
        );
        assert_eq!(bank.get(1, 0), Register::at(3, true));
        assert_eq!(bank.get(1, 1), Register::at(2, false));
        assert_eq!(bank.get(0, 0), Register::ABSENT);
    }

    #[test]
    fn copy_duplicates_a_row() {
        let mut bank = Registers::new(3);
        bank.set(0, Register::at(1, true), Register::at(4, false));
        execute_commands(
            &mut bank,
            &[TagMapCommand::copy(2, 0)],
            Register::ABSENT,
            Register::ABSENT,
        );
        assert_eq!(bank.get(2, 0), Register::at(1, true));
        assert_eq!(bank.get(2, 1), Register::at(4, false));
    }

    #[test]
    fn commands_run_in_order() {
        let mut bank = Registers::new(2);
        let cmds = [TagMapCommand::copy(1, 0), TagMapCommand::current_position(0)];
        bank.set(0, Register::at(7, true), Register::ABSENT);
        execute_commands(&mut bank, &cmds, Register::at(9, true), Register::ABSENT);
        assert_eq!(bank.get(1, 0), Register::at(7, true));
        assert_eq!(bank.get(0, 0), Register::at(9, true));
    }

    #[test]
    fn bank_equality_is_cellwise() {
        let mut a = Registers::new(1);
        let mut b = Registers::new(1);
        assert_eq!(a, b);
        a.set(0, Register::at(0, true), Register::ABSENT);
        assert_ne!(a, b);
        b.clone_from(&a);
        assert_eq!(a, b);
        b.clear();
        assert_eq!(b, Registers::new(1));
    }
}
