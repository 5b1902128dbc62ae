//! Bytecode: registers, qwords, instructions and the `Code` container.
//!
//! Instructions are self-contained. Everything the VM needs to evaluate a
//! node (the native function, its operands and where to put the result) is
//! copied into the instruction, so executing `Code` never touches the
//! graph it was compiled from.

use std::fmt;

use nodlang_core::id::NodeId;
use nodlang_core::language::NativeFn;
use nodlang_core::variant::{ValueKind, Variant};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Registers and qwords
// ---------------------------------------------------------------------------

/// General purpose registers. The instruction pointer is not addressable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Register {
    /// Accumulator: holds the value of the last evaluated statement.
    Rax,
    /// Storage register, used as the right-hand side of comparisons.
    Rdx,
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Register::Rax => f.write_str("rax"),
            Register::Rdx => f.write_str("rdx"),
        }
    }
}

/// A memory cell of the VM: the storage of a declared variable, or the
/// result of an operator or function node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ValueSlot {
    Variable(NodeId),
    Temp(NodeId),
}

impl ValueSlot {
    pub fn node(self) -> NodeId {
        match self {
            ValueSlot::Variable(id) | ValueSlot::Temp(id) => id,
        }
    }
}

impl fmt::Display for ValueSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueSlot::Variable(id) => write!(f, "var:{id}"),
            ValueSlot::Temp(id) => write!(f, "tmp:{id}"),
        }
    }
}

/// The VM's unit of data: a scalar, a pointer to a slot, or a register id.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum Qword {
    #[default]
    Empty,
    Bool(bool),
    Int(i64),
    Double(f64),
    Ptr(ValueSlot),
    Register(Register),
}

impl Qword {
    /// The qword holding `value` directly. Strings do not fit in a qword and
    /// are only reachable through a [`Qword::Ptr`].
    pub fn from_variant(value: &Variant) -> Option<Qword> {
        match value {
            Variant::Null => Some(Qword::Empty),
            Variant::Bool(b) => Some(Qword::Bool(*b)),
            Variant::Int(i) => Some(Qword::Int(*i)),
            Variant::Double(d) => Some(Qword::Double(*d)),
            Variant::String(_) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Qword::Empty)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Qword::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Qword::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Qword::Double(d) => Some(*d),
            Qword::Int(i) => Some(*i as f64),
            _ => None,
        }
    }
}

impl fmt::Display for Qword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Qword::Empty => f.write_str("empty"),
            Qword::Bool(b) => write!(f, "{b}"),
            Qword::Int(i) => write!(f, "{i}"),
            Qword::Double(d) => write!(f, "{d:?}"),
            Qword::Ptr(slot) => write!(f, "[{slot}]"),
            Qword::Register(r) => write!(f, "{r}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Node evaluation
// ---------------------------------------------------------------------------

/// Where an evaluation reads a value from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    Const(Variant),
    /// Copy of a slot's value.
    Read(ValueSlot),
    /// A slot the callee may write through. The VM stores the argument
    /// back after the call.
    Ref(ValueSlot),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Const(Variant::String(s)) => write!(f, "{s:?}"),
            Operand::Const(value) => write!(f, "{value}"),
            Operand::Read(slot) => write!(f, "{slot}"),
            Operand::Ref(slot) => write!(f, "&{slot}"),
        }
    }
}

/// The work behind one `eval_node` instruction.
#[derive(Clone)]
pub enum NodeEval {
    /// Calls a native function. Arguments are coerced to `params`, the
    /// result to `result`.
    Invoke {
        identifier: String,
        func: NativeFn,
        params: Vec<ValueKind>,
        args: Vec<Operand>,
        output: ValueSlot,
        result: ValueKind,
    },
    /// Writes a variable's initial value: its initializer, or the default of
    /// `kind`.
    Declare {
        variable: ValueSlot,
        kind: ValueKind,
        initializer: Option<Operand>,
    },
    /// Copies a value into a slot, so it can be addressed by pointer.
    Forward { value: Operand, output: ValueSlot },
}

impl fmt::Debug for NodeEval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeEval::Invoke {
                identifier,
                params,
                args,
                output,
                result,
                ..
            } => f
                .debug_struct("Invoke")
                .field("identifier", identifier)
                .field("params", params)
                .field("args", args)
                .field("output", output)
                .field("result", result)
                .finish_non_exhaustive(),
            NodeEval::Declare {
                variable,
                kind,
                initializer,
            } => f
                .debug_struct("Declare")
                .field("variable", variable)
                .field("kind", kind)
                .field("initializer", initializer)
                .finish(),
            NodeEval::Forward { value, output } => f
                .debug_struct("Forward")
                .field("value", value)
                .field("output", output)
                .finish(),
        }
    }
}

impl fmt::Display for NodeEval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeEval::Invoke {
                identifier,
                args,
                output,
                ..
            } => {
                write!(f, "invoke {identifier} (")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ") -> {output}")
            }
            NodeEval::Declare {
                variable,
                kind,
                initializer,
            } => match initializer {
                Some(init) => write!(f, "declare {variable} ({kind}) = {init}"),
                None => write!(f, "declare {variable} ({kind})"),
            },
            NodeEval::Forward { value, output } => write!(f, "forward {value} -> {output}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Instructions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum Instruction {
    /// Copies `src` into `dst`. A `Qword::Register` source reads that
    /// register.
    Mov { dst: Register, src: Qword },
    /// Stores `left == right` into `rax` as a bool.
    Cmp { left: Qword, right: Qword },
    /// Relative jump.
    Jmp { offset: i64 },
    /// Relative jump taken when `rax` holds `false`.
    Jne { offset: i64 },
    EvalNode { node: NodeId, eval: NodeEval },
    /// Loads a slot into a register: scalars by value, strings as a pointer.
    DerefPtr {
        node: NodeId,
        dst: Register,
        ptr: ValueSlot,
        kind: ValueKind,
    },
    PushStackFrame { scope: NodeId },
    PopStackFrame { scope: NodeId },
    PushVar { variable: NodeId, kind: ValueKind },
    PopVar { variable: NodeId },
    Ret,
}

impl Instruction {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Instruction::Mov { .. } => "mov",
            Instruction::Cmp { .. } => "cmp",
            Instruction::Jmp { .. } => "jmp",
            Instruction::Jne { .. } => "jne",
            Instruction::EvalNode { .. } => "eval_node",
            Instruction::DerefPtr { .. } => "deref_ptr",
            Instruction::PushStackFrame { .. } => "push_stack_frame",
            Instruction::PopStackFrame { .. } => "pop_stack_frame",
            Instruction::PushVar { .. } => "push_var",
            Instruction::PopVar { .. } => "pop_var",
            Instruction::Ret => "ret",
        }
    }

    /// The graph node this instruction evaluates, for highlighting.
    pub fn node(&self) -> Option<NodeId> {
        match self {
            Instruction::EvalNode { node, .. } | Instruction::DerefPtr { node, .. } => Some(*node),
            _ => None,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = self.mnemonic();
        match self {
            Instruction::Mov { dst, src } => write!(f, "{op} {dst}, {src}"),
            Instruction::Cmp { left, right } => write!(f, "{op} {left}, {right}"),
            Instruction::Jmp { offset } | Instruction::Jne { offset } => write!(f, "{op} {offset:+}"),
            Instruction::EvalNode { node, eval } => write!(f, "{op} {node} {eval}"),
            Instruction::DerefPtr { dst, ptr, kind, .. } => write!(f, "{op} {dst}, {ptr} ({kind})"),
            Instruction::PushStackFrame { scope } | Instruction::PopStackFrame { scope } => {
                write!(f, "{op} {scope}")
            }
            Instruction::PushVar { variable, kind } => write!(f, "{op} {variable} ({kind})"),
            Instruction::PopVar { variable } => write!(f, "{op} {variable}"),
            Instruction::Ret => f.write_str(op),
        }
    }
}

// ---------------------------------------------------------------------------
// Code
// ---------------------------------------------------------------------------

/// Diagnostics carried alongside the instructions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodeMeta {
    pub root: Option<NodeId>,
}

/// A compiled program.
#[derive(Debug, Clone, Default)]
pub struct Code {
    instructions: Vec<Instruction>,
    meta: CodeMeta,
}

impl Code {
    pub fn new(meta: CodeMeta) -> Self {
        Code {
            instructions: Vec::new(),
            meta,
        }
    }

    /// Appends an instruction and returns its index.
    pub fn push(&mut self, instruction: Instruction) -> usize {
        self.instructions.push(instruction);
        self.instructions.len() - 1
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn get(&self, index: usize) -> Option<&Instruction> {
        self.instructions.get(index)
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut Instruction> {
        self.instructions.get_mut(index)
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn meta(&self) -> &CodeMeta {
        &self.meta
    }

    pub fn mnemonics(&self) -> Vec<&'static str> {
        self.instructions.iter().map(Instruction::mnemonic).collect()
    }
}

/// Assembly listing, one instruction per line.
impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, instruction) in self.instructions.iter().enumerate() {
            writeln!(f, "{index:04}: {instruction}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strings_do_not_fit_a_qword() {
        assert_eq!(Qword::from_variant(&Variant::Int(3)), Some(Qword::Int(3)));
        assert_eq!(Qword::from_variant(&Variant::Null), Some(Qword::Empty));
        assert_eq!(Qword::from_variant(&Variant::String("s".into())), None);
    }

    #[test]
    fn instruction_text() {
        let id = NodeId::new(4, 2);
        let cases = [
            (
                Instruction::Mov {
                    dst: Register::Rdx,
                    src: Qword::Bool(true),
                },
                "mov rdx, true",
            ),
            (
                Instruction::Cmp {
                    left: Qword::Register(Register::Rax),
                    right: Qword::Register(Register::Rdx),
                },
                "cmp rax, rdx",
            ),
            (Instruction::Jne { offset: 6 }, "jne +6"),
            (Instruction::Jmp { offset: -11 }, "jmp -11"),
            (
                Instruction::DerefPtr {
                    node: id,
                    dst: Register::Rax,
                    ptr: ValueSlot::Temp(id),
                    kind: ValueKind::Double,
                },
                "deref_ptr rax, tmp:4v2 (double)",
            ),
            (
                Instruction::PushVar {
                    variable: id,
                    kind: ValueKind::Int,
                },
                "push_var 4v2 (int)",
            ),
            (Instruction::Ret, "ret"),
        ];
        for (instruction, text) in cases {
            assert_eq!(instruction.to_string(), text);
        }
    }

    #[test]
    fn eval_node_text() {
        let id = NodeId::new(1, 1);
        let eval = NodeEval::Declare {
            variable: ValueSlot::Variable(id),
            kind: ValueKind::String,
            initializer: Some(Operand::Const(Variant::String("hi".into()))),
        };
        assert_eq!(eval.to_string(), "declare var:1v1 (string) = \"hi\"");
    }

    #[test]
    fn qword_serializes() {
        let json = serde_json::to_string(&Qword::Ptr(ValueSlot::Variable(NodeId::new(2, 3)))).unwrap();
        let back: Qword = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Qword::Ptr(ValueSlot::Variable(NodeId::new(2, 3))));
    }
}
