//! Register machine state and the instruction loop.
//!
//! The VM has two general purpose registers (`rax`, `rdx`), an instruction
//! pointer and a slot memory keyed by [`ValueSlot`]. It moves through
//! `Stopped -> Running | Debugging -> Stopped`: [`VirtualMachine::run_program`]
//! steps until `ret`, [`VirtualMachine::debug_program`] leaves the pace to
//! the caller's [`VirtualMachine::step_over`] calls.

use std::sync::Arc;

use indexmap::IndexMap;
use nodlang_compiler::code::{Code, Instruction, NodeEval, Operand, Qword, Register, ValueSlot};
use nodlang_core::id::NodeId;
use nodlang_core::variant::Variant;
use serde::Serialize;
use tracing::{debug, trace};

use crate::error::VmError;
use crate::trace::TraceEntry;

/// Lifecycle of the VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VmState {
    Stopped,
    Running,
    Debugging,
}

impl VmState {
    fn describe(self) -> String {
        match self {
            VmState::Stopped => "stopped".into(),
            VmState::Running => "running".into(),
            VmState::Debugging => "debugging".into(),
        }
    }
}

/// Configuration for the virtual machine.
#[derive(Debug, Clone)]
pub struct VmConfig {
    /// Whether to record a [`TraceEntry`] per executed instruction.
    pub trace_enabled: bool,
    /// Instructions a single run may execute before faulting.
    pub max_steps: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            trace_enabled: false,
            max_steps: 1_000_000,
        }
    }
}

/// The variables one `push_stack_frame` brought into existence.
#[derive(Debug, Clone)]
struct Frame {
    scope: NodeId,
    variables: Vec<NodeId>,
}

pub struct VirtualMachine {
    state: VmState,
    config: VmConfig,
    code: Option<Arc<Code>>,
    rax: Qword,
    rdx: Qword,
    eip: usize,
    memory: IndexMap<ValueSlot, Variant>,
    frames: Vec<Frame>,
    next_node: Option<NodeId>,
    steps: usize,
    trace: Option<Vec<TraceEntry>>,
}

impl Default for VirtualMachine {
    fn default() -> Self {
        VirtualMachine::new(VmConfig::default())
    }
}

impl VirtualMachine {
    pub fn new(config: VmConfig) -> Self {
        VirtualMachine {
            state: VmState::Stopped,
            config,
            code: None,
            rax: Qword::Empty,
            rdx: Qword::Empty,
            eip: 0,
            memory: IndexMap::new(),
            frames: Vec::new(),
            next_node: None,
            steps: 0,
            trace: None,
        }
    }

    pub fn state(&self) -> VmState {
        self.state
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: VmConfig) {
        self.config = config;
    }

    pub fn is_loaded(&self) -> bool {
        self.code.is_some()
    }

    pub fn code(&self) -> Option<&Code> {
        self.code.as_deref()
    }

    pub fn eip(&self) -> usize {
        self.eip
    }

    pub fn register(&self, register: Register) -> Qword {
        match register {
            Register::Rax => self.rax,
            Register::Rdx => self.rdx,
        }
    }

    /// The graph node the next evaluating instruction works on.
    pub fn next_node(&self) -> Option<NodeId> {
        self.next_node
    }

    /// Recorded steps of the current run, when tracing is enabled.
    pub fn trace(&self) -> Option<&[TraceEntry]> {
        self.trace.as_deref()
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Loads `code`, resetting registers and memory.
    pub fn load_program(&mut self, code: Code) -> Result<(), VmError> {
        if self.code.is_some() {
            return Err(VmError::AlreadyLoaded);
        }
        debug!(instructions = code.len(), "program loaded");
        self.code = Some(Arc::new(code));
        self.reset();
        Ok(())
    }

    /// Runs the loaded program from the start until `ret` and returns the
    /// accumulator.
    pub fn run_program(&mut self) -> Result<Qword, VmError> {
        self.begin("run", VmState::Running)?;
        while self.step_over()? {}
        Ok(self.rax)
    }

    /// Prepares the loaded program for stepping without executing anything.
    pub fn debug_program(&mut self) -> Result<(), VmError> {
        self.begin("debug", VmState::Debugging)
    }

    /// Executes one instruction. Returns `false` once `ret` has executed.
    pub fn step_over(&mut self) -> Result<bool, VmError> {
        if self.state == VmState::Stopped {
            return Err(VmError::InvalidState {
                action: "step",
                state: self.state.describe(),
            });
        }
        match self.execute() {
            Ok(running) => {
                if !running {
                    debug!(steps = self.steps, rax = %self.rax, "program returned");
                    self.state = VmState::Stopped;
                }
                Ok(running)
            }
            Err(err) => {
                debug!(error = %err, "vm fault");
                self.state = VmState::Stopped;
                Err(err)
            }
        }
    }

    pub fn stop_program(&mut self) {
        self.state = VmState::Stopped;
    }

    /// Unloads the program and clears registers and memory.
    pub fn release_program(&mut self) {
        self.state = VmState::Stopped;
        self.code = None;
        self.reset();
    }

    // -----------------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------------

    /// The accumulator: the value of the last evaluated statement.
    pub fn get_last_result(&self) -> Qword {
        self.rax
    }

    /// The accumulator with pointers followed and registers resolved.
    pub fn last_value(&self) -> Option<Variant> {
        self.resolve(&self.rax)
    }

    pub fn read(&self, slot: ValueSlot) -> Option<&Variant> {
        self.memory.get(&slot)
    }

    /// The value a qword stands for: scalars as themselves, pointers through
    /// memory, registers through their content.
    pub fn resolve(&self, qword: &Qword) -> Option<Variant> {
        match qword {
            Qword::Empty => Some(Variant::Null),
            Qword::Bool(b) => Some(Variant::Bool(*b)),
            Qword::Int(i) => Some(Variant::Int(*i)),
            Qword::Double(d) => Some(Variant::Double(*d)),
            Qword::Ptr(slot) => self.read(*slot).cloned(),
            Qword::Register(r) => match self.register(*r) {
                Qword::Register(_) => None,
                inner => self.resolve(&inner),
            },
        }
    }

    // -----------------------------------------------------------------------
    // Execution
    // -----------------------------------------------------------------------

    fn begin(&mut self, action: &'static str, state: VmState) -> Result<(), VmError> {
        if self.code.is_none() {
            return Err(VmError::NoProgram);
        }
        if self.state != VmState::Stopped {
            return Err(VmError::InvalidState {
                action,
                state: self.state.describe(),
            });
        }
        self.reset();
        self.state = state;
        self.next_node = self.look_ahead();
        Ok(())
    }

    fn reset(&mut self) {
        self.rax = Qword::Empty;
        self.rdx = Qword::Empty;
        self.eip = 0;
        self.memory.clear();
        self.frames.clear();
        self.next_node = None;
        self.steps = 0;
        self.trace = self.config.trace_enabled.then(Vec::new);
    }

    fn look_ahead(&self) -> Option<NodeId> {
        let code = self.code.as_ref()?;
        code.instructions().get(self.eip..)?.iter().find_map(Instruction::node)
    }

    fn execute(&mut self) -> Result<bool, VmError> {
        let code = Arc::clone(self.code.as_ref().ok_or(VmError::NoProgram)?);
        if self.steps >= self.config.max_steps {
            return Err(VmError::StepLimit {
                limit: self.config.max_steps,
            });
        }
        let eip = self.eip;
        let instruction = code.get(eip).ok_or(VmError::EndOfCode { eip })?;
        self.steps += 1;

        let mut next = eip + 1;
        let mut running = true;
        match instruction {
            Instruction::Mov { dst, src } => {
                let value = self.fetch(*src);
                self.set(*dst, value);
            }
            Instruction::Cmp { left, right } => {
                let equal = self.fetch(*left) == self.fetch(*right);
                self.rax = Qword::Bool(equal);
            }
            Instruction::Jmp { offset } => next = jump_target(eip, *offset)?,
            Instruction::Jne { offset } => {
                if self.rax == Qword::Bool(false) {
                    next = jump_target(eip, *offset)?;
                }
            }
            Instruction::EvalNode { node, eval } => self.eval(eip, *node, eval)?,
            Instruction::DerefPtr { dst, ptr, .. } => {
                let value = self
                    .memory
                    .get(ptr)
                    .ok_or(VmError::NullDereference { eip, slot: *ptr })?;
                let qword = Qword::from_variant(value).unwrap_or(Qword::Ptr(*ptr));
                self.set(*dst, qword);
            }
            Instruction::PushStackFrame { scope } => self.frames.push(Frame {
                scope: *scope,
                variables: Vec::new(),
            }),
            Instruction::PopStackFrame { scope } => match self.frames.pop() {
                Some(frame) if frame.scope == *scope && frame.variables.is_empty() => {}
                Some(frame) => {
                    return Err(VmError::FrameMismatch {
                        eip,
                        message: format!("expected frame {scope}, found {} with live variables", frame.scope),
                    })
                }
                None => {
                    return Err(VmError::FrameMismatch {
                        eip,
                        message: format!("pop of frame {scope} with no frame pushed"),
                    })
                }
            },
            Instruction::PushVar { variable, kind } => {
                let frame = self.frames.last_mut().ok_or_else(|| VmError::FrameMismatch {
                    eip,
                    message: format!("variable {variable} pushed outside any frame"),
                })?;
                frame.variables.push(*variable);
                self.memory
                    .insert(ValueSlot::Variable(*variable), Variant::default_for(*kind));
            }
            Instruction::PopVar { variable } => {
                let top = self.frames.last_mut().and_then(|f| f.variables.pop());
                if top != Some(*variable) {
                    return Err(VmError::FrameMismatch {
                        eip,
                        message: format!("variable {variable} is not the last one pushed"),
                    });
                }
                self.memory.shift_remove(&ValueSlot::Variable(*variable));
            }
            Instruction::Ret => running = false,
        }

        trace!(eip, %instruction, rax = %self.rax, "step");
        if let Some(entries) = self.trace.as_mut() {
            entries.push(TraceEntry {
                eip,
                instruction: instruction.to_string(),
                rax: self.rax,
            });
        }

        self.eip = next;
        self.next_node = if running { self.look_ahead() } else { None };
        Ok(running)
    }

    fn eval(&mut self, eip: usize, node: NodeId, eval: &NodeEval) -> Result<(), VmError> {
        let failed = |source| VmError::Eval { eip, node, source };
        match eval {
            NodeEval::Invoke {
                func,
                params,
                args,
                output,
                result,
                ..
            } => {
                let mut values = Vec::with_capacity(args.len());
                for (arg, kind) in args.iter().zip(params) {
                    let value = self.operand(eip, arg)?;
                    values.push(value.coerce(*kind).map_err(failed)?);
                }
                let value = (*func)(values.as_mut_slice()).map_err(failed)?;
                for (arg, value) in args.iter().zip(values) {
                    if let Operand::Ref(slot) = arg {
                        self.write(eip, *slot, value)?;
                    }
                }
                let value = value.coerce(*result).map_err(failed)?;
                self.memory.insert(*output, value);
            }
            NodeEval::Declare {
                variable,
                kind,
                initializer,
            } => {
                let value = match initializer {
                    Some(operand) => self.operand(eip, operand)?.coerce(*kind).map_err(failed)?,
                    None => Variant::default_for(*kind),
                };
                self.write(eip, *variable, value)?;
            }
            NodeEval::Forward { value, output } => {
                let value = self.operand(eip, value)?;
                self.memory.insert(*output, value);
            }
        }
        Ok(())
    }

    fn operand(&self, eip: usize, operand: &Operand) -> Result<Variant, VmError> {
        match operand {
            Operand::Const(value) => Ok(value.clone()),
            Operand::Read(slot) | Operand::Ref(slot) => self
                .memory
                .get(slot)
                .cloned()
                .ok_or(VmError::NullDereference { eip, slot: *slot }),
        }
    }

    /// Stores into an allocated slot. Variables only exist between their
    /// `push_var` and `pop_var`.
    fn write(&mut self, eip: usize, slot: ValueSlot, value: Variant) -> Result<(), VmError> {
        match self.memory.get_mut(&slot) {
            Some(cell) => {
                *cell = value;
                Ok(())
            }
            None => Err(VmError::NullDereference { eip, slot }),
        }
    }

    fn fetch(&self, qword: Qword) -> Qword {
        match qword {
            Qword::Register(r) => self.register(r),
            other => other,
        }
    }

    fn set(&mut self, register: Register, value: Qword) {
        match register {
            Register::Rax => self.rax = value,
            Register::Rdx => self.rdx = value,
        }
    }
}

fn jump_target(eip: usize, offset: i64) -> Result<usize, VmError> {
    usize::try_from(eip as i64 + offset).map_err(|_| VmError::EndOfCode { eip })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use nodlang_compiler::code::CodeMeta;
    use nodlang_compiler::compile;
    use nodlang_core::error::EvalError;
    use nodlang_core::graph::Graph;
    use nodlang_core::language::Language;
    use nodlang_core::variant::ValueKind;
    use nodlang_parser::parse;
    use proptest::prelude::*;

    use super::*;

    fn build(source: &str) -> (Graph, Code) {
        let mut graph = Graph::new(Arc::new(Language::standard().unwrap()));
        parse(source, &mut graph).unwrap_or_else(|err| panic!("{source:?}: {err}"));
        let code = compile(&graph).unwrap_or_else(|err| panic!("{source:?}: {err}"));
        (graph, code)
    }

    fn loaded(source: &str, config: VmConfig) -> (Graph, VirtualMachine) {
        let (graph, code) = build(source);
        let mut vm = VirtualMachine::new(config);
        vm.load_program(code).unwrap();
        (graph, vm)
    }

    fn variable(graph: &Graph, name: &str) -> ValueSlot {
        let root = graph.node(graph.root().unwrap()).unwrap();
        ValueSlot::Variable(root.scope().unwrap().get(name).unwrap())
    }

    fn run(source: &str) -> (Graph, VirtualMachine) {
        let (graph, mut vm) = loaded(source, VmConfig::default());
        vm.run_program().unwrap_or_else(|err| panic!("{source:?}: {err}"));
        (graph, vm)
    }

    #[test]
    fn adds_doubles() {
        let (graph, vm) = run("double a = 10.4; double b = 5.2; double c = a + b;");
        let Qword::Double(result) = vm.get_last_result() else {
            panic!("expected a double, got {:?}", vm.get_last_result());
        };
        assert!((result - 15.6).abs() < 1e-9);
        assert_eq!(vm.read(variable(&graph, "a")), Some(&Variant::Double(10.4)));
        assert_eq!(vm.state(), VmState::Stopped);
    }

    #[test]
    fn takes_the_else_branch() {
        let (graph, vm) = run("int a = 2; int b = 5; int c; if (a > b) { c = a; } else { c = b; }");
        assert_eq!(vm.read(variable(&graph, "c")), Some(&Variant::Int(5)));
    }

    #[test]
    fn takes_the_then_branch() {
        let (graph, vm) = run("int a = 7; int b = 5; int c; if (a > b) { c = a; } else { c = b; }");
        assert_eq!(vm.read(variable(&graph, "c")), Some(&Variant::Int(7)));
    }

    #[test]
    fn for_loop_sums() {
        let (graph, vm) = run("int s = 0; for (int i = 0; i < 4; i += 1) { s += i; }");
        assert_eq!(vm.read(variable(&graph, "s")), Some(&Variant::Int(6)));
    }

    #[test]
    fn while_loop_counts_down() {
        let (graph, vm) = run("int n = 5; int steps = 0; while (n > 0) { n -= 1; steps += 1; }");
        assert_eq!(vm.read(variable(&graph, "n")), Some(&Variant::Int(0)));
        assert_eq!(vm.read(variable(&graph, "steps")), Some(&Variant::Int(5)));
    }

    fn live_variables(vm: &VirtualMachine) -> usize {
        vm.memory
            .keys()
            .filter(|slot| matches!(slot, ValueSlot::Variable(_)))
            .count()
    }

    #[test]
    fn condition_declarations_are_allocated() {
        let (_, mut vm) = loaded("if (bool t = true) { 1; }", VmConfig::default());
        assert_eq!(vm.run_program(), Ok(Qword::Int(1)));
        assert_eq!(live_variables(&vm), 0);

        let (_, mut vm) = loaded("while (bool t = false) { 1; }", VmConfig::default());
        assert_eq!(vm.run_program(), Ok(Qword::Bool(false)));
        assert_eq!(live_variables(&vm), 0);
    }

    #[test]
    fn condition_declaration_is_visible_in_the_branch() {
        let (graph, vm) = run("int r = 0; if (bool t = r == 0) { r = 1; }");
        assert_eq!(vm.read(variable(&graph, "r")), Some(&Variant::Int(1)));
        assert_eq!(live_variables(&vm), 1);
    }

    #[test]
    fn else_if_condition_and_body_declarations() {
        let (graph, vm) = run(
            "int r = 0; if (false) { r = 1; } else if (bool u = r == 0) { int inner = 5; r = inner + 1; }",
        );
        assert_eq!(vm.read(variable(&graph, "r")), Some(&Variant::Int(6)));
        assert_eq!(live_variables(&vm), 1);
    }

    #[test]
    fn while_condition_declaration_is_reevaluated() {
        let (graph, vm) = run("int n = 3; int seen = 0; while (bool more = n > 0) { n -= 1; seen += 1; }");
        assert_eq!(vm.read(variable(&graph, "n")), Some(&Variant::Int(0)));
        assert_eq!(vm.read(variable(&graph, "seen")), Some(&Variant::Int(3)));
        assert_eq!(live_variables(&vm), 2);
    }

    #[test]
    fn inner_scope_variables_are_released() {
        let (graph, vm) = run("int outer = 1; { int inner = 2; outer = inner + 1; }");
        assert_eq!(vm.read(variable(&graph, "outer")), Some(&Variant::Int(3)));
        // Only the root frame's variable and temporaries survive.
        assert_eq!(live_variables(&vm), 1);
    }

    #[test]
    fn strings_are_returned_by_pointer() {
        let (_, vm) = run("string s = \"ab\" + \"c\";");
        assert!(matches!(vm.get_last_result(), Qword::Ptr(ValueSlot::Variable(_))));
        assert_eq!(vm.last_value(), Some(Variant::String("abc".into())));
    }

    #[test]
    fn widening_assignment_converts() {
        let (graph, vm) = run("double d = 1; d = 2;");
        assert_eq!(vm.read(variable(&graph, "d")), Some(&Variant::Double(2.0)));
    }

    #[test]
    fn debug_steps_one_instruction_at_a_time() {
        let (graph, mut vm) = loaded("int a = 1; a + 2;", VmConfig::default());
        vm.debug_program().unwrap();
        assert_eq!(vm.state(), VmState::Debugging);
        assert_eq!(vm.eip(), 0);
        let a = variable(&graph, "a").node();
        assert_eq!(vm.next_node(), Some(a));

        let mut steps = 0;
        while vm.step_over().unwrap() {
            steps += 1;
        }
        assert_eq!(steps + 1, vm.code().unwrap().len());
        assert_eq!(vm.get_last_result(), Qword::Int(3));
        assert_eq!(vm.state(), VmState::Stopped);
        assert_eq!(vm.next_node(), None);
    }

    #[test]
    fn division_by_zero_faults() {
        let (_, mut vm) = loaded("int z = 0; 1 / z;", VmConfig::default());
        let err = vm.run_program().unwrap_err();
        assert!(
            matches!(
                err,
                VmError::Eval {
                    source: EvalError::DivisionByZero,
                    ..
                }
            ),
            "{err:?}"
        );
        assert_eq!(vm.state(), VmState::Stopped);
    }

    #[test]
    fn step_limit_stops_endless_loops() {
        let config = VmConfig {
            max_steps: 100,
            ..VmConfig::default()
        };
        let (_, mut vm) = loaded("while (true) {}", config);
        assert_eq!(vm.run_program(), Err(VmError::StepLimit { limit: 100 }));
        assert_eq!(vm.state(), VmState::Stopped);
    }

    #[test]
    fn lifecycle_errors() {
        let mut vm = VirtualMachine::default();
        assert_eq!(vm.run_program(), Err(VmError::NoProgram));
        assert!(vm.step_over().is_err());

        let (_, code) = build("1;");
        vm.load_program(code.clone()).unwrap();
        assert_eq!(vm.load_program(code), Err(VmError::AlreadyLoaded));

        vm.debug_program().unwrap();
        assert!(matches!(vm.run_program(), Err(VmError::InvalidState { .. })));
        vm.stop_program();
        assert_eq!(vm.run_program(), Ok(Qword::Int(1)));
    }

    #[test]
    fn release_clears_everything() {
        let (graph, mut vm) = run("int a = 4;");
        vm.release_program();
        assert!(!vm.is_loaded());
        assert_eq!(vm.get_last_result(), Qword::Empty);
        assert_eq!(vm.read(variable(&graph, "a")), None);

        let (_, code) = build("2;");
        vm.load_program(code).unwrap();
        assert_eq!(vm.run_program(), Ok(Qword::Int(2)));
    }

    #[test]
    fn missing_ret_runs_off_the_end() {
        let mut code = Code::new(CodeMeta::default());
        code.push(Instruction::Mov {
            dst: Register::Rax,
            src: Qword::Int(1),
        });
        let mut vm = VirtualMachine::default();
        vm.load_program(code).unwrap();
        assert_eq!(vm.run_program(), Err(VmError::EndOfCode { eip: 1 }));
    }

    #[test]
    fn unbalanced_frames_fault() {
        let scope = NodeId::new(0, 1);
        let mut code = Code::new(CodeMeta::default());
        code.push(Instruction::PopStackFrame { scope });
        let mut vm = VirtualMachine::default();
        vm.load_program(code).unwrap();
        assert!(matches!(vm.run_program(), Err(VmError::FrameMismatch { eip: 0, .. })));
    }

    #[test]
    fn reading_an_unallocated_slot_faults() {
        let node = NodeId::new(3, 3);
        let slot = ValueSlot::Temp(node);
        let mut code = Code::new(CodeMeta::default());
        code.push(Instruction::DerefPtr {
            node,
            dst: Register::Rax,
            ptr: slot,
            kind: ValueKind::Int,
        });
        let mut vm = VirtualMachine::default();
        vm.load_program(code).unwrap();
        assert_eq!(vm.run_program(), Err(VmError::NullDereference { eip: 0, slot }));
    }

    #[test]
    fn trace_records_every_step() {
        let config = VmConfig {
            trace_enabled: true,
            ..VmConfig::default()
        };
        let (_, mut vm) = loaded("int a = 1; a = a + 1;", config);
        vm.run_program().unwrap();
        let trace = vm.trace().unwrap();
        assert_eq!(trace.len(), vm.code().unwrap().len());
        assert_eq!(trace[0].instruction.split(' ').next(), Some("push_stack_frame"));
        assert_eq!(trace.last().unwrap().rax, Qword::Int(2));
        assert!(serde_json::to_string(trace).is_ok());
    }

    proptest! {
        #[test]
        fn runs_are_deterministic(a in -1000i64..1000, b in -1000i64..1000) {
            let source = format!("int a = {a}; int b = {b}; a * b + a;");
            let (_, code) = build(&source);
            let mut vm = VirtualMachine::default();

            let mut results = Vec::new();
            for _ in 0..3 {
                vm.load_program(code.clone()).unwrap();
                results.push(vm.run_program().unwrap());
                vm.release_program();
            }
            prop_assert_eq!(results[0], Qword::Int(a * b + a));
            prop_assert!(results.iter().all(|r| *r == results[0]));
        }
    }
}
