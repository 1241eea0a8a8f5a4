//! Compiled form of a scenario script.

use serde::{Deserialize, Serialize};

use super::builtins::Builtin;
use super::value::ValueType;

pub const MAX_ENTRIES: usize = 255;
pub const MAX_LOCALS: usize = 128;
pub const MAX_GLOBALS: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    BitAnd,
    BitOr,
    Xor,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

impl BinOp {
    /// Result type of `lhs op rhs` where both sides have type `operand`,
    /// or `None` when the operator does not apply to that type.
    pub fn result_type(self, operand: ValueType) -> Option<ValueType> {
        use ValueType::*;
        match (self, operand) {
            (BinOp::Add, Int | Str) => Some(operand),
            (BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge, Int | Str) => Some(Bool),
            (BinOp::Eq | BinOp::Ne, _) => Some(Bool),
            (
                BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Rem | BinOp::BitAnd | BinOp::BitOr
                | BinOp::Xor,
                Int,
            ) => Some(Int),
            (BinOp::And | BinOp::Or, Bool) => Some(Bool),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnOp {
    Neg,
    BitNot,
    Not,
}

impl UnOp {
    pub fn operand_type(self) -> ValueType {
        match self {
            UnOp::Neg | UnOp::BitNot => ValueType::Int,
            UnOp::Not => ValueType::Bool,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    Local(u8),
    Global(u8),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Op {
    PushVar(Slot),
    PushStr(u32),
    PushInt(i64),
    PushParam(u8),
    /// Call a builtin with `argc` values from the stack. `out` names the
    /// variable that receives an updated in/out position, if any.
    Call {
        builtin: Builtin,
        argc: u8,
        keep: bool,
        out: Option<Slot>,
    },
    Unary(UnOp),
    Binary(BinOp),
    Store(Slot),
    JumpIfFalse(u32),
    Jump(u32),
    Ret,
    RetNone,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub name: String,
    pub params: u8,
    pub start: u32,
    pub locals: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalVar {
    pub name: String,
    pub ty: Option<ValueType>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Module {
    pub entries: Vec<Entry>,
    pub globals: Vec<GlobalVar>,
    pub strings: Vec<String>,
    pub code: Vec<Op>,
}

impl Module {
    /// Look up an entry point; names are matched case-insensitively.
    pub fn entry(&self, name: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.name.eq_ignore_ascii_case(name))
    }

    pub fn string(&self, index: u32) -> Option<&str> {
        self.strings.get(index as usize).map(String::as_str)
    }

    pub fn intern(&mut self, s: String) -> u32 {
        if let Some(i) = self.strings.iter().position(|x| *x == s) {
            return i as u32;
        }
        self.strings.push(s);
        (self.strings.len() - 1) as u32
    }
}
