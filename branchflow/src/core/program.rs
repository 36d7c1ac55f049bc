//! Ordered opcode queue.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::core::opcode::Opcode;

/// An ordered, mutable queue of opcodes representing one workflow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Program {
    opcodes: VecDeque<Opcode>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.opcodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.opcodes.len()
    }

    pub fn peek(&self) -> Option<&Opcode> {
        self.opcodes.front()
    }

    pub fn pop_front(&mut self) -> Option<Opcode> {
        self.opcodes.pop_front()
    }

    pub fn push_front(&mut self, opcode: Opcode) {
        self.opcodes.push_front(opcode);
    }

    pub fn push_back(&mut self, opcode: Opcode) {
        self.opcodes.push_back(opcode);
    }

    /// Insert `opcodes` ahead of the current contents, keeping their order.
    pub fn prepend(&mut self, opcodes: impl IntoIterator<Item = Opcode>) {
        let block: Vec<Opcode> = opcodes.into_iter().collect();
        for opcode in block.into_iter().rev() {
            self.opcodes.push_front(opcode);
        }
    }

    /// Append `opcodes` after the current contents.
    pub fn append(&mut self, opcodes: impl IntoIterator<Item = Opcode>) {
        self.opcodes.extend(opcodes);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Opcode> {
        self.opcodes.iter()
    }

    /// Index of the first opcode matching `predicate`.
    pub fn position(&self, predicate: impl Fn(&Opcode) -> bool) -> Option<usize> {
        self.opcodes.iter().position(predicate)
    }

    /// Split into `[0, at)` and `[at, len)`.
    pub fn split_at(mut self, at: usize) -> (Program, Program) {
        let at = at.min(self.opcodes.len());
        let tail = self.opcodes.split_off(at);
        (self, Program { opcodes: tail })
    }
}

impl FromIterator<Opcode> for Program {
    fn from_iter<I: IntoIterator<Item = Opcode>>(iter: I) -> Self {
        Self {
            opcodes: iter.into_iter().collect(),
        }
    }
}

impl From<Vec<Opcode>> for Program {
    fn from(opcodes: Vec<Opcode>) -> Self {
        Self {
            opcodes: opcodes.into(),
        }
    }
}

impl IntoIterator for Program {
    type Item = Opcode;
    type IntoIter = std::collections::vec_deque::IntoIter<Opcode>;

    fn into_iter(self) -> Self::IntoIter {
        self.opcodes.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::branch::BranchName;

    fn checkout(name: &str) -> Opcode {
        Opcode::checkout(BranchName::new(name).expect("branch"))
    }

    #[test]
    fn prepend_keeps_block_order() {
        let mut program = Program::from(vec![checkout("c")]);
        program.prepend(vec![checkout("a"), checkout("b")]);
        let names: Vec<Opcode> = program.into_iter().collect();
        assert_eq!(names, vec![checkout("a"), checkout("b"), checkout("c")]);
    }

    #[test]
    fn queue_operations() {
        let mut program = Program::new();
        program.push_back(checkout("b"));
        program.push_front(checkout("a"));
        program.append(vec![Opcode::Fetch]);
        assert_eq!(program.len(), 3);
        assert_eq!(program.peek(), Some(&checkout("a")));
        assert_eq!(program.pop_front(), Some(checkout("a")));
        assert_eq!(program.position(|op| *op == Opcode::Fetch), Some(1));

        let (head, tail) = program.split_at(1);
        assert_eq!(head, Program::from(vec![checkout("b")]));
        assert_eq!(tail, Program::from(vec![Opcode::Fetch]));
    }

    #[test]
    fn serializes_as_array() {
        let program = Program::from(vec![Opcode::Fetch]);
        let json = serde_json::to_string(&program).expect("serialize");
        assert_eq!(json, r#"[{"type":"fetch"}]"#);
    }
}
