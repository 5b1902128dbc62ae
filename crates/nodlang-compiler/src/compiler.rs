//! Graph to bytecode.
//!
//! [`compile`] validates the graph, then walks it depth-first from the root
//! scope. Statements become `eval_node` chains that leave their value in
//! `rax`. Control flow becomes forward and backward relative jumps whose
//! offsets are patched once every label is bound.

use indexmap::IndexSet;
use nodlang_core::graph::Graph;
use nodlang_core::id::{NodeId, PropertyId};
use nodlang_core::node::{
    NodeKind, CONDITION_PROPERTY, FOR_CONDITION_PROPERTY, FOR_INIT_PROPERTY, FOR_ITERATION_PROPERTY,
    ROOT_PROPERTY, VALUE_PROPERTY,
};
use nodlang_core::variant::{ValueKind, Variant};
use tracing::{debug, trace};

use crate::code::{Code, CodeMeta, Instruction, NodeEval, Operand, Qword, Register, ValueSlot};
use crate::error::CompileError;

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Checks that the program rooted at `graph.root()` can be compiled.
///
/// Only what the root reaches is inspected: statements through child and
/// successor edges, values through input edges. Detached fragments left
/// over from editing do not make a program invalid.
pub fn is_program_valid(graph: &Graph) -> Result<(), CompileError> {
    let root = graph.root().ok_or(CompileError::NoRoot)?;
    let mut validator = Validator {
        graph,
        statements: IndexSet::new(),
        values: IndexSet::new(),
        path: IndexSet::new(),
    };
    validator.statement(root)
}

struct Validator<'g> {
    graph: &'g Graph,
    statements: IndexSet<NodeId>,
    /// Values fully checked, cycles included.
    values: IndexSet<NodeId>,
    /// Values on the current input chain.
    path: IndexSet<NodeId>,
}

impl Validator<'_> {
    fn statement(&mut self, id: NodeId) -> Result<(), CompileError> {
        if !self.statements.insert(id) {
            return Ok(());
        }
        let graph = self.graph;
        let node = graph.node(id).ok_or(CompileError::NodeNotFound { node: id })?;

        self.inputs(id, node.properties().len())?;
        for &child in node.children() {
            self.statement(child)?;
        }
        for &next in node.successors() {
            self.statement(next)?;
        }
        Ok(())
    }

    fn inputs(&mut self, id: NodeId, count: usize) -> Result<(), CompileError> {
        for index in 0..count {
            if let Some(source) = self.graph.input_node(PropertyId::new(id, index as u16)) {
                self.value(source)?;
            }
        }
        Ok(())
    }

    fn value(&mut self, id: NodeId) -> Result<(), CompileError> {
        if self.values.contains(&id) {
            return Ok(());
        }
        if !self.path.insert(id) {
            return Err(CompileError::Cycle { node: id });
        }

        let graph = self.graph;
        let node = graph.node(id).ok_or(CompileError::NodeNotFound { node: id })?;
        match node.kind() {
            NodeKind::Variable(var) if !var.is_declared() => {
                return Err(CompileError::UndeclaredVariable {
                    node: id,
                    name: var.name().to_string(),
                });
            }
            NodeKind::Function(call) if node.invokable().is_none() => {
                return Err(CompileError::UnresolvedFunction {
                    node: id,
                    name: call.identifier.clone(),
                });
            }
            _ => {}
        }
        self.inputs(id, node.properties().len())?;

        self.path.shift_remove(&id);
        self.values.insert(id);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Compilation
// ---------------------------------------------------------------------------

/// Compiles the program rooted at `graph.root()`.
///
/// Pipeline:
/// 1. Validate the graph (invalid programs produce no code)
/// 2. Emit the root frame and everything it reaches
/// 3. Patch jump offsets
pub fn compile(graph: &Graph) -> Result<Code, CompileError> {
    // 1. Reject invalid programs before emitting anything
    is_program_valid(graph)?;
    let root = graph.root().ok_or(CompileError::NoRoot)?;

    // 2. Walk from the root
    let mut compiler = Compiler {
        graph,
        code: Code::new(CodeMeta { root: Some(root) }),
        labels: Vec::new(),
        patches: Vec::new(),
        initialized: IndexSet::new(),
    };
    compiler.frame(root, true, |c| c.statements(root))?;

    // 3. Every jump now has a bound target
    compiler.patch()?;

    debug!(%root, instructions = compiler.code.len(), "program compiled");
    Ok(compiler.code)
}

#[derive(Debug, Clone, Copy)]
struct Label(usize);

#[derive(Debug, Clone, Copy)]
enum Jump {
    Always,
    IfFalse,
}

struct Compiler<'g> {
    graph: &'g Graph,
    code: Code,
    /// Instruction index each label is bound to.
    labels: Vec<Option<usize>>,
    /// Jumps waiting for their label: (instruction index, label).
    patches: Vec<(usize, Label)>,
    /// Variables whose declaration has been emitted.
    initialized: IndexSet<NodeId>,
}

impl Compiler<'_> {
    fn emit(&mut self, instruction: Instruction) -> usize {
        trace!(index = self.code.len(), %instruction, "emit");
        self.code.push(instruction)
    }

    // -- labels --------------------------------------------------------------

    fn label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    fn bind(&mut self, label: Label) {
        if let Some(slot) = self.labels.get_mut(label.0) {
            *slot = Some(self.code.len());
        }
    }

    fn jump(&mut self, jump: Jump, label: Label) {
        let instruction = match jump {
            Jump::Always => Instruction::Jmp { offset: 0 },
            Jump::IfFalse => Instruction::Jne { offset: 0 },
        };
        let index = self.emit(instruction);
        self.patches.push((index, label));
    }

    fn patch(&mut self) -> Result<(), CompileError> {
        for (index, label) in std::mem::take(&mut self.patches) {
            let target = self
                .labels
                .get(label.0)
                .copied()
                .flatten()
                .ok_or_else(|| CompileError::InternalError {
                    message: format!("jump at {index} targets an unbound label"),
                })?;
            let delta = target as i64 - index as i64;
            match self.code.get_mut(index) {
                Some(Instruction::Jmp { offset }) | Some(Instruction::Jne { offset }) => *offset = delta,
                _ => {
                    return Err(CompileError::InternalError {
                        message: format!("instruction {index} is not a jump"),
                    })
                }
            }
        }
        Ok(())
    }

    // -- statements ----------------------------------------------------------

    /// Brackets `body` with the frame of `owner` and its declared variables.
    /// The root frame ends the program instead of being popped.
    fn frame<F>(&mut self, owner: NodeId, is_root: bool, body: F) -> Result<(), CompileError>
    where
        F: FnOnce(&mut Self) -> Result<(), CompileError>,
    {
        let graph = self.graph;
        let node = graph.node(owner).ok_or(CompileError::NodeNotFound { node: owner })?;
        let variables: Vec<NodeId> = node.scope().map(|s| s.variables().collect()).unwrap_or_default();

        self.emit(Instruction::PushStackFrame { scope: owner });
        for &variable in &variables {
            let kind = self.variable_kind(variable)?;
            self.emit(Instruction::PushVar { variable, kind });
        }

        body(self)?;

        if is_root {
            self.emit(Instruction::Ret);
        } else {
            for &variable in variables.iter().rev() {
                self.emit(Instruction::PopVar { variable });
            }
            self.emit(Instruction::PopStackFrame { scope: owner });
        }
        Ok(())
    }

    fn statements(&mut self, scope: NodeId) -> Result<(), CompileError> {
        let graph = self.graph;
        for &child in graph.children(scope) {
            self.statement(child)?;
        }
        Ok(())
    }

    fn statement(&mut self, id: NodeId) -> Result<(), CompileError> {
        let graph = self.graph;
        let node = graph.node(id).ok_or(CompileError::NodeNotFound { node: id })?;
        match node.kind() {
            NodeKind::Scope(_) => self.frame(id, false, |c| c.statements(id)),
            NodeKind::Instruction(_) => self.load(PropertyId::new(id, ROOT_PROPERTY)).map(|_| ()),
            NodeKind::Conditional(_) => self.frame(id, false, |c| c.conditional(id)),
            NodeKind::ForLoop(_) => self.frame(id, false, |c| c.for_loop(id)),
            NodeKind::WhileLoop(_) => self.frame(id, false, |c| c.while_loop(id)),
            other => Err(CompileError::UnexpectedNode {
                node: id,
                kind: other.label().to_string(),
            }),
        }
    }

    fn conditional(&mut self, id: NodeId) -> Result<(), CompileError> {
        let graph = self.graph;
        let branches = graph.successors(id);
        let otherwise = self.label();

        self.condition(id, PropertyId::new(id, CONDITION_PROPERTY), otherwise)?;
        if let Some(&then) = branches.first() {
            self.statement(then)?;
        }
        match branches.get(1) {
            Some(&branch) => {
                let end = self.label();
                self.jump(Jump::Always, end);
                self.bind(otherwise);
                self.statement(branch)?;
                self.bind(end);
            }
            None => self.bind(otherwise),
        }
        Ok(())
    }

    fn for_loop(&mut self, id: NodeId) -> Result<(), CompileError> {
        let head = self.label();
        let end = self.label();

        self.evaluate(PropertyId::new(id, FOR_INIT_PROPERTY))?;
        self.bind(head);
        self.condition(id, PropertyId::new(id, FOR_CONDITION_PROPERTY), end)?;
        self.body(id)?;
        self.evaluate(PropertyId::new(id, FOR_ITERATION_PROPERTY))?;
        self.jump(Jump::Always, head);
        self.bind(end);
        Ok(())
    }

    fn while_loop(&mut self, id: NodeId) -> Result<(), CompileError> {
        let head = self.label();
        let end = self.label();

        self.bind(head);
        self.condition(id, PropertyId::new(id, CONDITION_PROPERTY), end)?;
        self.body(id)?;
        self.jump(Jump::Always, head);
        self.bind(end);
        Ok(())
    }

    fn body(&mut self, id: NodeId) -> Result<(), CompileError> {
        let graph = self.graph;
        match graph.successors(id).first() {
            Some(&body) => self.statement(body),
            None => Ok(()),
        }
    }

    /// Loads the condition into `rax`, compares it with `true` and jumps to
    /// `otherwise` when it does not hold.
    fn condition(&mut self, owner: NodeId, target: PropertyId, otherwise: Label) -> Result<(), CompileError> {
        if !self.load(target)? {
            return Err(CompileError::MissingCondition { node: owner });
        }
        self.emit(Instruction::Mov {
            dst: Register::Rdx,
            src: Qword::Bool(true),
        });
        self.emit(Instruction::Cmp {
            left: Qword::Register(Register::Rax),
            right: Qword::Register(Register::Rdx),
        });
        self.jump(Jump::IfFalse, otherwise);
        Ok(())
    }

    // -- values --------------------------------------------------------------

    /// Emits the evaluation of whatever feeds `target` and loads the result
    /// into `rax`. Returns `false` when nothing is connected.
    fn load(&mut self, target: PropertyId) -> Result<bool, CompileError> {
        let graph = self.graph;
        let Some((source, syntax)) = graph.input_of(target) else {
            return Ok(false);
        };
        let (operand, kind) = self.operand(source.node, syntax.reference.is_some())?;

        match operand {
            Operand::Read(ptr) | Operand::Ref(ptr) => {
                self.emit(Instruction::DerefPtr {
                    node: ptr.node(),
                    dst: Register::Rax,
                    ptr,
                    kind,
                });
            }
            Operand::Const(value) => match Qword::from_variant(&value) {
                Some(src) => {
                    self.emit(Instruction::Mov { dst: Register::Rax, src });
                }
                None => {
                    // Strings live in memory; rax can only point at them.
                    let ptr = ValueSlot::Temp(source.node);
                    self.emit(Instruction::EvalNode {
                        node: source.node,
                        eval: NodeEval::Forward {
                            value: Operand::Const(value),
                            output: ptr,
                        },
                    });
                    self.emit(Instruction::DerefPtr {
                        node: source.node,
                        dst: Register::Rax,
                        ptr,
                        kind,
                    });
                }
            },
        }
        Ok(true)
    }

    /// Emits the evaluation of whatever feeds `target` without loading it.
    fn evaluate(&mut self, target: PropertyId) -> Result<(), CompileError> {
        let graph = self.graph;
        if let Some((source, syntax)) = graph.input_of(target) {
            self.operand(source.node, syntax.reference.is_some())?;
        }
        Ok(())
    }

    /// Emits whatever is needed for node `id` to hold its value, and returns
    /// where that value can be read.
    ///
    /// A variable reached through an edge that is not a reference is at its
    /// declaration, so its initialization is emitted there (once).
    fn operand(&mut self, id: NodeId, is_reference: bool) -> Result<(Operand, ValueKind), CompileError> {
        let graph = self.graph;
        let types = graph.types();
        let node = graph.node(id).ok_or(CompileError::NodeNotFound { node: id })?;

        match node.kind() {
            NodeKind::Variable(var) => {
                if !var.is_declared() {
                    return Err(CompileError::UndeclaredVariable {
                        node: id,
                        name: var.name().to_string(),
                    });
                }
                let slot = ValueSlot::Variable(id);
                let kind = types.value_kind(var.ty);
                if !is_reference && self.initialized.insert(id) {
                    let initializer = match graph.input_of(PropertyId::new(id, VALUE_PROPERTY)) {
                        Some((source, syntax)) => Some(self.operand(source.node, syntax.reference.is_some())?.0),
                        None => None,
                    };
                    self.emit(Instruction::EvalNode {
                        node: id,
                        eval: NodeEval::Declare {
                            variable: slot,
                            kind,
                            initializer,
                        },
                    });
                }
                Ok((Operand::Read(slot), kind))
            }
            NodeKind::Literal(_) => {
                let property = node
                    .property(VALUE_PROPERTY)
                    .ok_or_else(|| CompileError::InternalError {
                        message: format!("literal {id} has no value"),
                    })?;
                Ok((Operand::Const(property.value().clone()), types.value_kind(property.ty())))
            }
            NodeKind::Operator(_) | NodeKind::Function(_) => {
                let invokable_id = node.invokable().ok_or_else(|| CompileError::UnresolvedFunction {
                    node: id,
                    name: node.name().to_string(),
                })?;
                let invokable = graph
                    .language()
                    .invokable(invokable_id)
                    .ok_or_else(|| CompileError::InternalError {
                        message: format!("node {id} names a missing invokable"),
                    })?;

                let mut params = Vec::with_capacity(invokable.signature.args.len());
                let mut args = Vec::with_capacity(invokable.signature.args.len());
                for (index, arg) in invokable.signature.args.iter().enumerate() {
                    let target = PropertyId::new(id, index as u16);
                    let operand = match graph.input_of(target) {
                        Some((source, syntax)) => {
                            let (operand, _) = self.operand(source.node, syntax.reference.is_some())?;
                            match operand {
                                Operand::Read(slot) if types.is_reference(arg.ty) => Operand::Ref(slot),
                                other => other,
                            }
                        }
                        None => Operand::Const(
                            node.property(index as u16)
                                .map(|p| p.value().clone())
                                .unwrap_or(Variant::Null),
                        ),
                    };
                    params.push(types.value_kind(arg.ty));
                    args.push(operand);
                }

                let output = ValueSlot::Temp(id);
                let result = types.value_kind(invokable.signature.return_type);
                self.emit(Instruction::EvalNode {
                    node: id,
                    eval: NodeEval::Invoke {
                        identifier: invokable.signature.identifier.clone(),
                        func: invokable.func,
                        params,
                        args,
                        output,
                        result,
                    },
                });
                Ok((Operand::Read(output), result))
            }
            other => Err(CompileError::UnexpectedNode {
                node: id,
                kind: other.label().to_string(),
            }),
        }
    }

    fn variable_kind(&self, id: NodeId) -> Result<ValueKind, CompileError> {
        let var = self
            .graph
            .node(id)
            .and_then(|n| n.as_variable())
            .ok_or(CompileError::NodeNotFound { node: id })?;
        Ok(self.graph.types().value_kind(var.ty))
    }
}
