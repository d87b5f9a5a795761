//! The register-file interpreter.
//!
//! One `run_unit` invocation owns a register file sized by the unit's
//! `max_registers`, with the fixed assignments: register 0 holds the
//! executing code value, register 1 the argument array (`@_`, aliased),
//! register 2 the calling-context tag. Capture slots follow from 3.
//! Registers persist across jumps, which is what makes Perl's
//! non-structured `last`/`next`/`redo` safe to compile to plain jumps.
//!
//! Dispatch is a single exhaustive match over the opcode; errors unwind to
//! the innermost registered `eval` handler or propagate to the caller.

mod call;
mod exceptions;

use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::{
    ast::Node,
    bytecode::{
        code::{CodeUnit, Constant},
        op::Opcode,
    },
    exception::{RunError, RunResult},
    runtime::{
        array as array_ops, hash as hash_ops,
        io::{IoHandle, OutputSink, StdSink},
        refs,
        regex::{self, compile_pattern},
        scalar::{self, numify, stringify, stringify_payload},
    },
    state::{FrameInfo, GlobalState},
    tracer::{ExecTracer, NoopTracer},
    value::{
        Array, Code, FlowKind, FlowMarker, Glob, Hash, List, RangeValue, Scalar, ScalarPayload,
        Value, ValueIter,
    },
};
use exceptions::{catch_or_propagate, Handler};

/// Calling context passed to every invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum CallContext {
    Void = 0,
    Scalar = 1,
    List = 2,
}

impl CallContext {
    #[must_use]
    pub fn tag(self) -> i64 {
        self as i64
    }
}

/// An embeddable engine instance: global state plus an output sink.
///
/// Hosts wanting several independent engines create several `Interp`s;
/// nothing is shared between instances.
pub struct Interp {
    state: GlobalState,
    out: Box<dyn OutputSink>,
}

impl Default for Interp {
    fn default() -> Self {
        Self::new()
    }
}

impl Interp {
    /// An engine writing to process stdout/stderr.
    #[must_use]
    pub fn new() -> Self {
        Self::with_output(Box::new(StdSink))
    }

    #[must_use]
    pub fn with_output(out: Box<dyn OutputSink>) -> Self {
        Self {
            state: GlobalState::new(),
            out,
        }
    }

    /// Direct access to the engine state, for embedding hosts and tests.
    pub fn state(&mut self) -> &mut GlobalState {
        &mut self.state
    }

    /// Executes a compiled unit.
    ///
    /// `args` is flattened into the argument array; the result is the
    /// unit's return value (a list value unless the unit returned a single
    /// scalar). A control-flow marker escaping the top of the call stack
    /// is an error here.
    pub fn execute(
        &mut self,
        unit: &Rc<CodeUnit>,
        args: Value,
        ctx: CallContext,
        sub_name: Option<&str>,
    ) -> RunResult<Value> {
        let mut tracer = NoopTracer;
        self.execute_traced(unit, args, ctx, sub_name, &mut tracer)
    }

    /// [`Interp::execute`] with an explicit tracer.
    pub fn execute_traced(
        &mut self,
        unit: &Rc<CodeUnit>,
        args: Value,
        ctx: CallContext,
        sub_name: Option<&str>,
        tracer: &mut impl ExecTracer,
    ) -> RunResult<Value> {
        let mut vm = Vm {
            state: &mut self.state,
            out: self.out.as_mut(),
            tracer,
            depth: 0,
        };
        let arg_array = Array::from_scalars(args.pl_list());
        let name = sub_name.unwrap_or("main");
        vm.tracer.on_enter(name);
        let result = vm.run_unit(unit, None, arg_array, ctx.tag(), 0);
        vm.tracer.on_exit(name);
        match result {
            Ok(value) => match value.as_flow() {
                Some(marker) => Err(RunError::unmatched_marker(marker)),
                None => Ok(value),
            },
            Err(e) => Err(e),
        }
    }

    /// Installs the `eval STRING` parser hook.
    pub fn set_parser_hook(
        &mut self,
        hook: impl Fn(&str, &crate::ast::PragmaSnapshot) -> Result<Node, crate::exception::CompileError> + 'static,
    ) {
        self.state.set_parser_hook(Box::new(hook));
    }
}

/// Per-engine execution context borrowed for the duration of one
/// top-level `execute`.
pub(crate) struct Vm<'a, T: ExecTracer> {
    state: &'a mut GlobalState,
    out: &'a mut dyn OutputSink,
    tracer: &'a mut T,
    depth: usize,
}

/// Fetches the next operand word, advancing the pc.
macro_rules! fetch {
    ($words:expr, $pc:expr) => {{
        let word = $words[$pc];
        $pc += 1;
        word
    }};
}

/// Fetches a register-number operand.
macro_rules! fetch_reg {
    ($words:expr, $pc:expr) => {{
        usize::try_from(fetch!($words, $pc)).expect("register operand is non-negative")
    }};
}

/// Unwraps a fallible step, unwinding to an `eval` handler on error.
macro_rules! vm_try {
    ($self:expr, $unit:expr, $handlers:expr, $pc:expr, $op_pc:expr, $expr:expr) => {
        match $expr {
            Ok(v) => v,
            Err(e) => {
                match catch_or_propagate($self.state, $unit, &mut $handlers, e, $op_pc) {
                    Ok(resume) => {
                        $pc = resume;
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            }
        }
    };
}

impl<T: ExecTracer> Vm<'_, T> {
    /// Runs one unit to completion, exception, or marker return.
    pub(crate) fn run_unit(
        &mut self,
        unit: &Rc<CodeUnit>,
        self_code: Option<Code>,
        args: Array,
        ctx_tag: i64,
        call_line: u32,
    ) -> RunResult<Value> {
        self.state.push_frame(FrameInfo {
            package: Rc::from(unit.pragma.compile_package.as_str()),
            sub_name: unit.name.clone().unwrap_or_else(|| Rc::from("__ANON__")),
            file: unit.source_name.clone(),
            line: call_line,
        });
        let dyn_level = self.state.current_level();
        let package_depth = self.state.package_depth();
        let result = self.dispatch(unit, self_code, args, ctx_tag);
        // frame pop, dynamic-stack restore, and package-stack balance run
        // on every exit path, including errors and marker returns
        self.state.pop_to_level(dyn_level);
        self.state.truncate_packages(package_depth);
        self.state.pop_frame();
        result
    }

    #[expect(clippy::too_many_lines, reason = "the dispatch loop is one exhaustive match")]
    fn dispatch(&mut self, unit: &Rc<CodeUnit>, self_code: Option<Code>, args: Array, ctx_tag: i64) -> RunResult<Value> {
        let reg_count = usize::from(unit.max_registers).max(3);
        let mut regs: Vec<Value> = (0..reg_count).map(|_| Value::undef()).collect();
        regs[0] = match &self_code {
            Some(code) => Value::Code(code.clone()),
            None => Value::undef(),
        };
        // capture slots before the argument registers so a closure's cells
        // land in 3..3+N
        if let Some(code) = &self_code {
            for (i, captured) in code.value().captures.iter().enumerate() {
                regs[3 + i] = captured.clone();
            }
        }
        regs[1] = Value::Array(args);
        regs[2] = Value::Scalar(Scalar::from_int(ctx_tag));

        let words = &unit.instructions;
        let mut handlers: Vec<Handler> = Vec::new();
        let mut pc = 0usize;

        loop {
            if pc >= words.len() {
                return Ok(Value::empty_list());
            }
            let op_pc = pc;
            let op = u16::try_from(words[pc])
                .ok()
                .and_then(Opcode::from_repr)
                .ok_or_else(|| {
                    RunError::internal(format!(
                        "invalid opcode word {} at pc {op_pc}\n{}",
                        words[pc],
                        unit.disasm_window(op_pc, 4)
                    ))
                })?;
            pc += 1;
            self.tracer.on_opcode(op_pc, op);

            match op {
                // ----------------------------------------------------------
                // Control flow
                // ----------------------------------------------------------
                Opcode::Nop => {}
                Opcode::Jump => {
                    pc = usize::try_from(fetch!(words, pc)).expect("jump target is non-negative");
                }
                Opcode::JumpIfTrue | Opcode::JumpIfFalse | Opcode::JumpIfDefined | Opcode::JumpIfUndef => {
                    let rs = fetch_reg!(words, pc);
                    let target = usize::try_from(fetch!(words, pc)).expect("jump target is non-negative");
                    let take = match op {
                        Opcode::JumpIfTrue => regs[rs].pl_truthy(),
                        Opcode::JumpIfFalse => !regs[rs].pl_truthy(),
                        Opcode::JumpIfDefined => regs[rs].pl_defined(),
                        _ => !regs[rs].pl_defined(),
                    };
                    if take {
                        pc = target;
                    }
                }
                Opcode::Return => {
                    let rs = fetch_reg!(words, pc);
                    return Ok(regs[rs].clone());
                }
                Opcode::ReturnEmpty => return Ok(Value::empty_list()),
                Opcode::MakeLast | Opcode::MakeNext | Opcode::MakeRedo | Opcode::MakeGoto => {
                    let rd = fetch_reg!(words, pc);
                    let label_word = fetch!(words, pc);
                    let label = if label_word < 0 { None } else { Some(unit.string(label_word)) };
                    let kind = match op {
                        Opcode::MakeLast => FlowKind::Last,
                        Opcode::MakeNext => FlowKind::Next,
                        Opcode::MakeRedo => FlowKind::Redo,
                        _ => FlowKind::Goto,
                    };
                    regs[rd] = Value::Flow(Rc::new(FlowMarker {
                        kind,
                        label,
                        origin: crate::ast::SourcePos::new(0, unit.line_for_pc(op_pc)),
                    }));
                }

                // ----------------------------------------------------------
                // Register ops
                // ----------------------------------------------------------
                Opcode::Move => {
                    let rd = fetch_reg!(words, pc);
                    let rs = fetch_reg!(words, pc);
                    regs[rd] = regs[rs].clone();
                }
                Opcode::LoadUndef => {
                    let rd = fetch_reg!(words, pc);
                    regs[rd] = Value::undef();
                }
                Opcode::LoadInt => {
                    let rd = fetch_reg!(words, pc);
                    let imm = fetch!(words, pc);
                    regs[rd] = Value::Scalar(Scalar::from_int(i64::from(imm)));
                }
                Opcode::LoadStr => {
                    let rd = fetch_reg!(words, pc);
                    let idx = fetch!(words, pc);
                    regs[rd] = Value::Scalar(Scalar::from_str_rc(unit.string(idx)));
                }
                Opcode::LoadConst => {
                    let rd = fetch_reg!(words, pc);
                    let idx = usize::try_from(fetch!(words, pc)).expect("constant index is non-negative");
                    regs[rd] = constant_to_value(&unit.constants[idx]);
                }
                Opcode::ScalarAssign => {
                    let rd = fetch_reg!(words, pc);
                    let rs = fetch_reg!(words, pc);
                    let source = regs[rs].pl_scalar();
                    let target = regs[rd].pl_scalar();
                    vm_try!(self, unit, handlers, pc, op_pc, target.assign_payload(source.payload()));
                }

                // ----------------------------------------------------------
                // Global access
                // ----------------------------------------------------------
                Opcode::LoadGlobalScalar => {
                    let rd = fetch_reg!(words, pc);
                    let name = unit.string(fetch!(words, pc));
                    regs[rd] = Value::Scalar(self.state.get_scalar(&name));
                }
                Opcode::StoreGlobalScalar => {
                    let name = unit.string(fetch!(words, pc));
                    let rs = fetch_reg!(words, pc);
                    let source = regs[rs].pl_scalar();
                    let target = self.state.get_scalar(&name);
                    vm_try!(self, unit, handlers, pc, op_pc, target.assign_payload(source.payload()));
                }
                Opcode::LoadGlobalArray => {
                    let rd = fetch_reg!(words, pc);
                    let name = unit.string(fetch!(words, pc));
                    regs[rd] = Value::Array(self.state.get_array(&name));
                }
                Opcode::LoadGlobalHash => {
                    let rd = fetch_reg!(words, pc);
                    let name = unit.string(fetch!(words, pc));
                    regs[rd] = Value::Hash(self.state.get_hash(&name));
                }
                Opcode::LoadGlobalCode => {
                    let rd = fetch_reg!(words, pc);
                    let name = unit.string(fetch!(words, pc));
                    let code = vm_try!(
                        self,
                        unit,
                        handlers,
                        pc,
                        op_pc,
                        self.state
                            .get_code(&name)
                            .ok_or_else(|| RunError::msg(format!("Undefined subroutine &{name} called")))
                    );
                    regs[rd] = Value::Code(code);
                }
                Opcode::LoadGlobalGlob => {
                    let rd = fetch_reg!(words, pc);
                    let name = unit.string(fetch!(words, pc));
                    regs[rd] = Value::Glob(self.state.glob(&name));
                }
                Opcode::StoreGlobalCode => {
                    let name = unit.string(fetch!(words, pc));
                    let rs = fetch_reg!(words, pc);
                    let code = vm_try!(self, unit, handlers, pc, op_pc, self.resolve_callable(&regs[rs]));
                    self.state.set_code(&name, code);
                }
                Opcode::GlobAssign => {
                    let name = unit.string(fetch!(words, pc));
                    let rs = fetch_reg!(words, pc);
                    let glob = self.state.glob(&name);
                    glob.assign_by_kind(&regs[rs]);
                }
                Opcode::LoadScalarByName => {
                    let rd = fetch_reg!(words, pc);
                    let rs = fetch_reg!(words, pc);
                    let name = stringify(&regs[rs].pl_scalar());
                    let package = self.state.current_package();
                    let qualified = refs::qualify(&name, &package);
                    regs[rd] = Value::Scalar(self.state.get_scalar(&qualified));
                }
                Opcode::StoreScalarByName => {
                    let rn = fetch_reg!(words, pc);
                    let rv = fetch_reg!(words, pc);
                    let name = stringify(&regs[rn].pl_scalar());
                    let package = self.state.current_package();
                    let qualified = refs::qualify(&name, &package);
                    let target = self.state.get_scalar(&qualified);
                    let source = regs[rv].pl_scalar();
                    vm_try!(self, unit, handlers, pc, op_pc, target.assign_payload(source.payload()));
                }
                Opcode::GlobalScalarSwap => {
                    let rd = fetch_reg!(words, pc);
                    let name = unit.string(fetch!(words, pc));
                    let rs = fetch_reg!(words, pc);
                    let replacement = regs[rs].pl_scalar();
                    let old = self.state.glob(&name).swap_scalar(replacement);
                    regs[rd] = Value::Scalar(old);
                }

                // ----------------------------------------------------------
                // Arithmetic & string
                // ----------------------------------------------------------
                Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Pow | Opcode::Concat => {
                    let rd = fetch_reg!(words, pc);
                    let a = regs[fetch_reg!(words, pc)].pl_scalar();
                    let b = regs[fetch_reg!(words, pc)].pl_scalar();
                    let result = match op {
                        Opcode::Add => scalar::add(&a, &b),
                        Opcode::Sub => scalar::sub(&a, &b),
                        Opcode::Mul => scalar::mul(&a, &b),
                        Opcode::Pow => scalar::pow(&a, &b),
                        _ => scalar::concat(&a, &b),
                    };
                    regs[rd] = Value::Scalar(result);
                }
                Opcode::Div | Opcode::Mod => {
                    let rd = fetch_reg!(words, pc);
                    let a = regs[fetch_reg!(words, pc)].pl_scalar();
                    let b = regs[fetch_reg!(words, pc)].pl_scalar();
                    let result = if op == Opcode::Div {
                        scalar::div(&a, &b)
                    } else {
                        scalar::modulo(&a, &b)
                    };
                    regs[rd] = Value::Scalar(vm_try!(self, unit, handlers, pc, op_pc, result));
                }
                Opcode::Neg => {
                    let rd = fetch_reg!(words, pc);
                    let a = regs[fetch_reg!(words, pc)].pl_scalar();
                    regs[rd] = Value::Scalar(scalar::neg(&a));
                }
                Opcode::Repeat => {
                    let rd = fetch_reg!(words, pc);
                    let ra = fetch_reg!(words, pc);
                    let count = regs[fetch_reg!(words, pc)].pl_scalar();
                    regs[rd] = match &regs[ra] {
                        Value::List(list) => {
                            let n = numify(&count).as_i64();
                            Value::List(List::from_scalars(array_ops::repeat_list(&list.scalars(), n)))
                        }
                        other => Value::Scalar(scalar::repeat_str(&other.pl_scalar(), &count)),
                    };
                }
                Opcode::StrLength => {
                    let rd = fetch_reg!(words, pc);
                    let a = regs[fetch_reg!(words, pc)].pl_scalar();
                    regs[rd] = Value::Scalar(if a.is_defined() {
                        Scalar::from_int(
                            i64::try_from(stringify(&a).chars().count()).expect("length fits i64"),
                        )
                    } else {
                        Scalar::undef()
                    });
                }
                Opcode::AddAssign | Opcode::SubAssign | Opcode::MulAssign | Opcode::DivAssign | Opcode::ConcatAssign => {
                    let rd = fetch_reg!(words, pc);
                    let rs = fetch_reg!(words, pc);
                    let target = regs[rd].pl_scalar();
                    let rhs = regs[rs].pl_scalar();
                    let result = match op {
                        Opcode::AddAssign => scalar::add_assign(&target, &rhs),
                        Opcode::SubAssign => scalar::sub_assign(&target, &rhs),
                        Opcode::MulAssign => scalar::mul_assign(&target, &rhs),
                        Opcode::DivAssign => scalar::div_assign(&target, &rhs),
                        _ => scalar::concat_assign(&target, &rhs),
                    };
                    vm_try!(self, unit, handlers, pc, op_pc, result);
                }
                Opcode::Inc => {
                    let r = fetch_reg!(words, pc);
                    let target = regs[r].pl_scalar();
                    vm_try!(self, unit, handlers, pc, op_pc, scalar::increment(&target));
                }
                Opcode::Dec => {
                    let r = fetch_reg!(words, pc);
                    let target = regs[r].pl_scalar();
                    vm_try!(self, unit, handlers, pc, op_pc, scalar::decrement(&target));
                }

                // ----------------------------------------------------------
                // Comparison
                // ----------------------------------------------------------
                Opcode::NumEq | Opcode::NumNe | Opcode::NumLt | Opcode::NumGt | Opcode::NumLe | Opcode::NumGe => {
                    let rd = fetch_reg!(words, pc);
                    let a = regs[fetch_reg!(words, pc)].pl_scalar();
                    let b = regs[fetch_reg!(words, pc)].pl_scalar();
                    let ordering = scalar::num_cmp(&a, &b);
                    regs[rd] = Value::Scalar(Scalar::from_bool(compare_result(op, ordering)));
                }
                Opcode::NumCmp => {
                    let rd = fetch_reg!(words, pc);
                    let a = regs[fetch_reg!(words, pc)].pl_scalar();
                    let b = regs[fetch_reg!(words, pc)].pl_scalar();
                    regs[rd] = Value::Scalar(Scalar::from_int(ordering_to_int(scalar::num_cmp(&a, &b))));
                }
                Opcode::StrEq | Opcode::StrNe | Opcode::StrLt | Opcode::StrGt | Opcode::StrLe | Opcode::StrGe => {
                    let rd = fetch_reg!(words, pc);
                    let a = regs[fetch_reg!(words, pc)].pl_scalar();
                    let b = regs[fetch_reg!(words, pc)].pl_scalar();
                    let ordering = scalar::str_cmp(&a, &b);
                    regs[rd] = Value::Scalar(Scalar::from_bool(compare_result(op, ordering)));
                }
                Opcode::StrCmp => {
                    let rd = fetch_reg!(words, pc);
                    let a = regs[fetch_reg!(words, pc)].pl_scalar();
                    let b = regs[fetch_reg!(words, pc)].pl_scalar();
                    regs[rd] = Value::Scalar(Scalar::from_int(ordering_to_int(scalar::str_cmp(&a, &b))));
                }

                // ----------------------------------------------------------
                // Logical & bitwise
                // ----------------------------------------------------------
                Opcode::Not => {
                    let rd = fetch_reg!(words, pc);
                    let rs = fetch_reg!(words, pc);
                    let truthy = regs[rs].pl_truthy();
                    regs[rd] = Value::Scalar(Scalar::from_bool(!truthy));
                }
                Opcode::BitAnd | Opcode::BitOr | Opcode::BitXor | Opcode::Shl | Opcode::Shr
                | Opcode::BitAndStr | Opcode::BitOrStr | Opcode::BitXorStr => {
                    let rd = fetch_reg!(words, pc);
                    let a = regs[fetch_reg!(words, pc)].pl_scalar();
                    let b = regs[fetch_reg!(words, pc)].pl_scalar();
                    let result = match op {
                        Opcode::BitAnd => scalar::bit_and(&a, &b),
                        Opcode::BitOr => scalar::bit_or(&a, &b),
                        Opcode::BitXor => scalar::bit_xor(&a, &b),
                        Opcode::Shl => scalar::shift_left(&a, &b),
                        Opcode::Shr => scalar::shift_right(&a, &b),
                        Opcode::BitAndStr => scalar::bit_and_str(&a, &b),
                        Opcode::BitOrStr => scalar::bit_or_str(&a, &b),
                        _ => scalar::bit_xor_str(&a, &b),
                    };
                    regs[rd] = Value::Scalar(result);
                }
                Opcode::BitNot => {
                    let rd = fetch_reg!(words, pc);
                    let a = regs[fetch_reg!(words, pc)].pl_scalar();
                    regs[rd] = Value::Scalar(scalar::bit_not(&a));
                }

                // ----------------------------------------------------------
                // Aggregates
                // ----------------------------------------------------------
                Opcode::CreateArray => {
                    let rd = fetch_reg!(words, pc);
                    regs[rd] = Value::Array(Array::new());
                }
                Opcode::CreateHash => {
                    let rd = fetch_reg!(words, pc);
                    regs[rd] = Value::Hash(Hash::new());
                }
                Opcode::CreateList => {
                    let rd = fetch_reg!(words, pc);
                    regs[rd] = Value::List(List::new());
                }
                Opcode::ListPush => {
                    let rlist = fetch_reg!(words, pc);
                    let rs = fetch_reg!(words, pc);
                    let elems = regs[rs].pl_list();
                    let Value::List(list) = &regs[rlist] else {
                        return Err(self.type_error(unit, op_pc, op, "list register does not hold a list"));
                    };
                    for s in elems {
                        list.push(s);
                    }
                }
                Opcode::ListFromRegs => {
                    let rd = fetch_reg!(words, pc);
                    let rbase = fetch_reg!(words, pc);
                    let count = usize::try_from(fetch!(words, pc)).expect("count is non-negative");
                    let list = List::new();
                    for i in 0..count {
                        for s in regs[rbase + i].pl_list() {
                            list.push(s);
                        }
                    }
                    regs[rd] = Value::List(list);
                }
                Opcode::ListGet => {
                    let rd = fetch_reg!(words, pc);
                    let rlist = fetch_reg!(words, pc);
                    let ridx = fetch_reg!(words, pc);
                    let idx = numify(&regs[ridx].pl_scalar()).as_i64();
                    let scalars = regs[rlist].pl_list();
                    let resolved = resolve_list_index(idx, scalars.len());
                    regs[rd] = Value::Scalar(
                        resolved
                            .and_then(|i| scalars.get(i).cloned())
                            .unwrap_or_else(Scalar::undef),
                    );
                }
                Opcode::ListSliceFrom => {
                    let rd = fetch_reg!(words, pc);
                    let rlist = fetch_reg!(words, pc);
                    let ridx = fetch_reg!(words, pc);
                    let idx = usize::try_from(numify(&regs[ridx].pl_scalar()).as_i64().max(0))
                        .expect("non-negative index fits usize");
                    let scalars = regs[rlist].pl_list();
                    let tail = scalars.get(idx..).unwrap_or(&[]).to_vec();
                    regs[rd] = Value::List(List::from_scalars(tail));
                }
                Opcode::ListSnapshot => {
                    let rd = fetch_reg!(words, pc);
                    let rs = fetch_reg!(words, pc);
                    let copies: Vec<Scalar> = regs[rs].pl_list().iter().map(Scalar::copy).collect();
                    regs[rd] = Value::List(List::from_scalars(copies));
                }
                Opcode::ListCount => {
                    let rd = fetch_reg!(words, pc);
                    let rlist = fetch_reg!(words, pc);
                    let count = regs[rlist].pl_list().len();
                    regs[rd] = Value::Scalar(Scalar::from_int(i64::try_from(count).expect("count fits i64")));
                }
                Opcode::ListSlice => {
                    let rd = fetch_reg!(words, pc);
                    let rlist = fetch_reg!(words, pc);
                    let rkeys = fetch_reg!(words, pc);
                    let scalars = regs[rlist].pl_list();
                    let out = List::new();
                    for key in regs[rkeys].pl_list() {
                        let idx = numify(&key).as_i64();
                        let element = resolve_list_index(idx, scalars.len())
                            .and_then(|i| scalars.get(i).cloned())
                            .unwrap_or_else(Scalar::undef);
                        out.push(element);
                    }
                    regs[rd] = Value::List(out);
                }
                Opcode::ArrayGet => {
                    let rd = fetch_reg!(words, pc);
                    let ra = fetch_reg!(words, pc);
                    let ridx = fetch_reg!(words, pc);
                    let idx = numify(&regs[ridx].pl_scalar()).as_i64();
                    regs[rd] = match &regs[ra] {
                        Value::Array(array) => Value::Scalar(array.get(idx)),
                        // `(LIST)[i]` reads through the same opcode
                        Value::List(list) => {
                            let scalars = list.scalars();
                            Value::Scalar(
                                resolve_list_index(idx, scalars.len())
                                    .and_then(|i| scalars.get(i).cloned())
                                    .unwrap_or_else(Scalar::undef),
                            )
                        }
                        other => {
                            return Err(self.type_error(
                                unit,
                                op_pc,
                                op,
                                &format!("element read from a {} value", other.kind_name()),
                            ));
                        }
                    };
                }
                Opcode::ArrayElemLv => {
                    let rd = fetch_reg!(words, pc);
                    let ra = fetch_reg!(words, pc);
                    let ridx = fetch_reg!(words, pc);
                    let idx = numify(&regs[ridx].pl_scalar()).as_i64();
                    let array = vm_try!(self, unit, handlers, pc, op_pc, self.expect_array(&regs[ra]));
                    let cell = vm_try!(
                        self,
                        unit,
                        handlers,
                        pc,
                        op_pc,
                        array
                            .elem_lv(idx)
                            .ok_or_else(|| RunError::msg("Modification of non-creatable array value attempted"))
                    );
                    regs[rd] = Value::Scalar(cell);
                }
                Opcode::ArraySet => {
                    let ra = fetch_reg!(words, pc);
                    let ridx = fetch_reg!(words, pc);
                    let rs = fetch_reg!(words, pc);
                    let idx = numify(&regs[ridx].pl_scalar()).as_i64();
                    let array = vm_try!(self, unit, handlers, pc, op_pc, self.expect_array(&regs[ra]));
                    let cell = vm_try!(
                        self,
                        unit,
                        handlers,
                        pc,
                        op_pc,
                        array
                            .elem_lv(idx)
                            .ok_or_else(|| RunError::msg("Modification of non-creatable array value attempted"))
                    );
                    let source = regs[rs].pl_scalar();
                    vm_try!(self, unit, handlers, pc, op_pc, cell.assign_payload(source.payload()));
                }
                Opcode::ArrayPush | Opcode::ArrayUnshift => {
                    let ra = fetch_reg!(words, pc);
                    let rs = fetch_reg!(words, pc);
                    let array = vm_try!(self, unit, handlers, pc, op_pc, self.expect_array(&regs[ra]));
                    let values: Vec<Scalar> = regs[rs].pl_list().iter().map(Scalar::copy).collect();
                    if op == Opcode::ArrayPush {
                        for v in values {
                            array.push(v);
                        }
                    } else {
                        array.unshift(values);
                    }
                }
                Opcode::ArrayPop | Opcode::ArrayShift => {
                    let rd = fetch_reg!(words, pc);
                    let ra = fetch_reg!(words, pc);
                    let array = vm_try!(self, unit, handlers, pc, op_pc, self.expect_array(&regs[ra]));
                    let taken = if op == Opcode::ArrayPop { array.pop() } else { array.shift() };
                    regs[rd] = Value::Scalar(taken.unwrap_or_else(Scalar::undef));
                }
                Opcode::ArraySize => {
                    let rd = fetch_reg!(words, pc);
                    let ra = fetch_reg!(words, pc);
                    let array = vm_try!(self, unit, handlers, pc, op_pc, self.expect_array(&regs[ra]));
                    regs[rd] = Value::Scalar(Scalar::from_int(
                        i64::try_from(array.len()).expect("length fits i64"),
                    ));
                }
                Opcode::ArrayLastIndex => {
                    let rd = fetch_reg!(words, pc);
                    let ra = fetch_reg!(words, pc);
                    let array = vm_try!(self, unit, handlers, pc, op_pc, self.expect_array(&regs[ra]));
                    regs[rd] = Value::Scalar(Scalar::from_int(
                        i64::try_from(array.len()).expect("length fits i64") - 1,
                    ));
                }
                Opcode::ArraySlice => {
                    let rd = fetch_reg!(words, pc);
                    let ra = fetch_reg!(words, pc);
                    let rkeys = fetch_reg!(words, pc);
                    let array = vm_try!(self, unit, handlers, pc, op_pc, self.expect_array(&regs[ra]));
                    let keys = regs[rkeys].pl_list();
                    regs[rd] = Value::List(List::from_scalars(array_ops::slice(&array, &keys)));
                }
                Opcode::ArraySliceSet => {
                    let ra = fetch_reg!(words, pc);
                    let rkeys = fetch_reg!(words, pc);
                    let rvals = fetch_reg!(words, pc);
                    let array = vm_try!(self, unit, handlers, pc, op_pc, self.expect_array(&regs[ra]));
                    let keys = regs[rkeys].pl_list();
                    let values = regs[rvals].pl_list();
                    vm_try!(self, unit, handlers, pc, op_pc, array_ops::slice_set(&array, &keys, &values));
                }
                Opcode::ArraySetFromList => {
                    let ra = fetch_reg!(words, pc);
                    let rlist = fetch_reg!(words, pc);
                    let array = vm_try!(self, unit, handlers, pc, op_pc, self.expect_array(&regs[ra]));
                    array.set_from_scalars(&regs[rlist].pl_list());
                }
                Opcode::HashGet => {
                    let rd = fetch_reg!(words, pc);
                    let rh = fetch_reg!(words, pc);
                    let rkey = fetch_reg!(words, pc);
                    let key = stringify(&regs[rkey].pl_scalar());
                    let hash = vm_try!(self, unit, handlers, pc, op_pc, self.expect_hash(&regs[rh]));
                    regs[rd] = Value::Scalar(hash.get(&key));
                }
                Opcode::HashElemLv => {
                    let rd = fetch_reg!(words, pc);
                    let rh = fetch_reg!(words, pc);
                    let rkey = fetch_reg!(words, pc);
                    let key = stringify(&regs[rkey].pl_scalar());
                    let hash = vm_try!(self, unit, handlers, pc, op_pc, self.expect_hash(&regs[rh]));
                    regs[rd] = Value::Scalar(hash.elem_lv(&key));
                }
                Opcode::HashSet => {
                    let rh = fetch_reg!(words, pc);
                    let rkey = fetch_reg!(words, pc);
                    let rs = fetch_reg!(words, pc);
                    let key = stringify(&regs[rkey].pl_scalar());
                    let hash = vm_try!(self, unit, handlers, pc, op_pc, self.expect_hash(&regs[rh]));
                    let source = regs[rs].pl_scalar();
                    let cell = hash.elem_lv(&key);
                    vm_try!(self, unit, handlers, pc, op_pc, cell.assign_payload(source.payload()));
                }
                Opcode::HashExists => {
                    let rd = fetch_reg!(words, pc);
                    let rh = fetch_reg!(words, pc);
                    let rkey = fetch_reg!(words, pc);
                    let key = stringify(&regs[rkey].pl_scalar());
                    let hash = vm_try!(self, unit, handlers, pc, op_pc, self.expect_hash(&regs[rh]));
                    regs[rd] = Value::Scalar(Scalar::from_bool(hash.exists(&key)));
                }
                Opcode::HashDelete => {
                    let rd = fetch_reg!(words, pc);
                    let rh = fetch_reg!(words, pc);
                    let rkey = fetch_reg!(words, pc);
                    let key = stringify(&regs[rkey].pl_scalar());
                    let hash = vm_try!(self, unit, handlers, pc, op_pc, self.expect_hash(&regs[rh]));
                    regs[rd] = Value::Scalar(hash.delete(&key).unwrap_or_else(Scalar::undef));
                }
                Opcode::HashKeys => {
                    let rd = fetch_reg!(words, pc);
                    let rh = fetch_reg!(words, pc);
                    let hash = vm_try!(self, unit, handlers, pc, op_pc, self.expect_hash(&regs[rh]));
                    let keys = hash.keys().into_iter().map(Scalar::from_str_rc).collect();
                    regs[rd] = Value::List(List::from_scalars(keys));
                }
                Opcode::HashValues => {
                    let rd = fetch_reg!(words, pc);
                    let rh = fetch_reg!(words, pc);
                    let hash = vm_try!(self, unit, handlers, pc, op_pc, self.expect_hash(&regs[rh]));
                    regs[rd] = Value::List(List::from_scalars(hash.values()));
                }
                Opcode::HashEach => {
                    let rd = fetch_reg!(words, pc);
                    let rh = fetch_reg!(words, pc);
                    let hash = vm_try!(self, unit, handlers, pc, op_pc, self.expect_hash(&regs[rh]));
                    let out = List::new();
                    if let Some((key, value)) = hash.each_next() {
                        out.push(Scalar::from_str_rc(key));
                        out.push(value);
                    }
                    regs[rd] = Value::List(out);
                }
                Opcode::HashCount => {
                    let rd = fetch_reg!(words, pc);
                    let rh = fetch_reg!(words, pc);
                    let hash = vm_try!(self, unit, handlers, pc, op_pc, self.expect_hash(&regs[rh]));
                    regs[rd] = Value::Scalar(Scalar::from_int(
                        i64::try_from(hash.len()).expect("length fits i64"),
                    ));
                }
                Opcode::HashSlice => {
                    let rd = fetch_reg!(words, pc);
                    let rh = fetch_reg!(words, pc);
                    let rkeys = fetch_reg!(words, pc);
                    let hash = vm_try!(self, unit, handlers, pc, op_pc, self.expect_hash(&regs[rh]));
                    let keys = regs[rkeys].pl_list();
                    regs[rd] = Value::List(List::from_scalars(hash_ops::slice(&hash, &keys)));
                }
                Opcode::HashSliceSet => {
                    let rh = fetch_reg!(words, pc);
                    let rkeys = fetch_reg!(words, pc);
                    let rvals = fetch_reg!(words, pc);
                    let hash = vm_try!(self, unit, handlers, pc, op_pc, self.expect_hash(&regs[rh]));
                    let keys = regs[rkeys].pl_list();
                    let values = regs[rvals].pl_list();
                    vm_try!(self, unit, handlers, pc, op_pc, hash_ops::slice_set(&hash, &keys, &values));
                }
                Opcode::HashSliceDelete => {
                    let rd = fetch_reg!(words, pc);
                    let rh = fetch_reg!(words, pc);
                    let rkeys = fetch_reg!(words, pc);
                    let hash = vm_try!(self, unit, handlers, pc, op_pc, self.expect_hash(&regs[rh]));
                    let keys = regs[rkeys].pl_list();
                    regs[rd] = Value::List(List::from_scalars(hash_ops::slice_delete(&hash, &keys)));
                }
                Opcode::HashKvSlice => {
                    let rd = fetch_reg!(words, pc);
                    let rh = fetch_reg!(words, pc);
                    let rkeys = fetch_reg!(words, pc);
                    let hash = vm_try!(self, unit, handlers, pc, op_pc, self.expect_hash(&regs[rh]));
                    let keys = regs[rkeys].pl_list();
                    regs[rd] = Value::List(List::from_scalars(hash_ops::kv_slice(&hash, &keys)));
                }
                Opcode::HashSetFromList => {
                    let rh = fetch_reg!(words, pc);
                    let rlist = fetch_reg!(words, pc);
                    let hash = vm_try!(self, unit, handlers, pc, op_pc, self.expect_hash(&regs[rh]));
                    let flat = regs[rlist].pl_list();
                    hash.set_from_pairs(&flat, |s| stringify(s));
                }
                Opcode::NewRange => {
                    let rd = fetch_reg!(words, pc);
                    let a = regs[fetch_reg!(words, pc)].pl_scalar();
                    let b = regs[fetch_reg!(words, pc)].pl_scalar();
                    regs[rd] = Value::Range(Rc::new(make_range(&a, &b)));
                }

                // ----------------------------------------------------------
                // References
                // ----------------------------------------------------------
                Opcode::CreateRef => {
                    let rd = fetch_reg!(words, pc);
                    let rs = fetch_reg!(words, pc);
                    regs[rd] = Value::Scalar(regs[rs].pl_make_ref());
                }
                Opcode::DerefScalar => {
                    let rd = fetch_reg!(words, pc);
                    let rs = fetch_reg!(words, pc);
                    let source = regs[rs].pl_scalar();
                    let inner = vm_try!(self, unit, handlers, pc, op_pc, refs::deref_scalar_strict(&source));
                    regs[rd] = Value::Scalar(inner);
                }
                Opcode::DerefScalarSym => {
                    let rd = fetch_reg!(words, pc);
                    let rs = fetch_reg!(words, pc);
                    let source = regs[rs].pl_scalar();
                    let inner = vm_try!(self, unit, handlers, pc, op_pc, refs::deref_scalar_symbolic(&source, self.state));
                    regs[rd] = Value::Scalar(inner);
                }
                Opcode::DerefArray => {
                    let rd = fetch_reg!(words, pc);
                    let rs = fetch_reg!(words, pc);
                    let source = regs[rs].pl_scalar();
                    let strict = unit.pragma.strict_refs;
                    let inner = vm_try!(self, unit, handlers, pc, op_pc, refs::deref_array(&source, self.state, strict));
                    regs[rd] = Value::Array(inner);
                }
                Opcode::DerefHash => {
                    let rd = fetch_reg!(words, pc);
                    let rs = fetch_reg!(words, pc);
                    let source = regs[rs].pl_scalar();
                    let strict = unit.pragma.strict_refs;
                    let inner = vm_try!(self, unit, handlers, pc, op_pc, refs::deref_hash(&source, self.state, strict));
                    regs[rd] = Value::Hash(inner);
                }
                Opcode::DerefCode => {
                    let rd = fetch_reg!(words, pc);
                    let rs = fetch_reg!(words, pc);
                    let code = match &regs[rs] {
                        Value::Code(code) => code.clone(),
                        other => {
                            let source = other.pl_scalar();
                            let strict = unit.pragma.strict_refs;
                            vm_try!(self, unit, handlers, pc, op_pc, refs::deref_code(&source, self.state, strict))
                        }
                    };
                    regs[rd] = Value::Code(code);
                }
                Opcode::DerefGlob => {
                    let rd = fetch_reg!(words, pc);
                    let rs = fetch_reg!(words, pc);
                    let glob = match &regs[rs] {
                        Value::Glob(glob) => glob.clone(),
                        other => {
                            let source = other.pl_scalar();
                            let strict = unit.pragma.strict_refs;
                            vm_try!(self, unit, handlers, pc, op_pc, refs::deref_glob(&source, self.state, strict))
                        }
                    };
                    regs[rd] = Value::Glob(glob);
                }
                Opcode::Bless => {
                    let rd = fetch_reg!(words, pc);
                    let rref = fetch_reg!(words, pc);
                    let rpkg = fetch_reg!(words, pc);
                    let reference = regs[rref].pl_scalar();
                    let package = stringify(&regs[rpkg].pl_scalar());
                    vm_try!(self, unit, handlers, pc, op_pc, refs::bless_ref(self.state, &reference, &package));
                    regs[rd] = Value::Scalar(reference);
                }
                Opcode::RefType => {
                    let rd = fetch_reg!(words, pc);
                    let rs = fetch_reg!(words, pc);
                    let source = regs[rs].pl_scalar();
                    regs[rd] = Value::Scalar(refs::ref_type(self.state, &source));
                }
                Opcode::Isa => {
                    let rd = fetch_reg!(words, pc);
                    let robj = fetch_reg!(words, pc);
                    let rclass = fetch_reg!(words, pc);
                    let object = regs[robj].pl_scalar();
                    let class = stringify(&regs[rclass].pl_scalar());
                    regs[rd] = Value::Scalar(Scalar::from_bool(refs::isa_check(self.state, &object, &class)));
                }
                Opcode::GetKind => {
                    let rd = fetch_reg!(words, pc);
                    let rs = fetch_reg!(words, pc);
                    regs[rd] = Value::Scalar(Scalar::from_string(regs[rs].kind_name()));
                }
                Opcode::AnonArray => {
                    let rd = fetch_reg!(words, pc);
                    let rlist = fetch_reg!(words, pc);
                    let array = Array::new();
                    array.set_from_scalars(&regs[rlist].pl_list());
                    regs[rd] = Value::Scalar(Value::Array(array).pl_make_ref());
                }
                Opcode::AnonHash => {
                    let rd = fetch_reg!(words, pc);
                    let rlist = fetch_reg!(words, pc);
                    let hash = Hash::new();
                    hash.set_from_pairs(&regs[rlist].pl_list(), |s| stringify(s));
                    regs[rd] = Value::Scalar(Value::Hash(hash).pl_make_ref());
                }

                // ----------------------------------------------------------
                // Calls
                // ----------------------------------------------------------
                Opcode::CallSub => {
                    let rd = fetch_reg!(words, pc);
                    let rcode = fetch_reg!(words, pc);
                    let rargs = fetch_reg!(words, pc);
                    let ctx_word = fetch!(words, pc);
                    let callee_ctx = self.resolve_ctx(ctx_word, &regs);
                    let code = vm_try!(self, unit, handlers, pc, op_pc, self.resolve_callable(&regs[rcode]));
                    let call_args = Array::from_scalars(regs[rargs].pl_list());
                    let line = unit.line_for_pc(op_pc);
                    let result = vm_try!(self, unit, handlers, pc, op_pc, self.call_code(&code, call_args, callee_ctx, line));
                    if let Some(next_pc) = self.consume_marker(unit, &result, op_pc, &regs)? {
                        match next_pc {
                            MarkerOutcome::Jump(target) => {
                                pc = target;
                                continue;
                            }
                            MarkerOutcome::Propagate => return Ok(result),
                        }
                    }
                    regs[rd] = contextualise(result, callee_ctx);
                }
                Opcode::CallMethod => {
                    let rd = fetch_reg!(words, pc);
                    let rinv = fetch_reg!(words, pc);
                    let rname = fetch_reg!(words, pc);
                    let rargs = fetch_reg!(words, pc);
                    let ctx_word = fetch!(words, pc);
                    let callee_ctx = self.resolve_ctx(ctx_word, &regs);
                    let invocant = regs[rinv].pl_scalar();
                    let method = stringify(&regs[rname].pl_scalar());
                    let call_args = regs[rargs].pl_list();
                    let line = unit.line_for_pc(op_pc);
                    let result = vm_try!(
                        self,
                        unit,
                        handlers,
                        pc,
                        op_pc,
                        self.call_method(
                            &invocant,
                            &method,
                            &call_args,
                            callee_ctx,
                            &unit.pragma.compile_package,
                            line
                        )
                    );
                    if let Some(outcome) = self.consume_marker(unit, &result, op_pc, &regs)? {
                        match outcome {
                            MarkerOutcome::Jump(target) => {
                                pc = target;
                                continue;
                            }
                            MarkerOutcome::Propagate => return Ok(result),
                        }
                    }
                    regs[rd] = contextualise(result, callee_ctx);
                }
                Opcode::CreateClosure => {
                    let rd = fetch_reg!(words, pc);
                    let cidx = usize::try_from(fetch!(words, pc)).expect("constant index is non-negative");
                    let rbase = fetch_reg!(words, pc);
                    let Constant::Unit(inner) = &unit.constants[cidx] else {
                        return Err(self.type_error(unit, op_pc, op, "closure constant is not a code unit"));
                    };
                    let count = inner.capture_names.len();
                    let captures: Vec<Value> = (0..count).map(|i| regs[rbase + i].clone()).collect();
                    regs[rd] = Value::Code(Code::new(Rc::clone(inner), captures, inner.name.clone()));
                }
                Opcode::EvalString => {
                    let rd = fetch_reg!(words, pc);
                    let rs = fetch_reg!(words, pc);
                    let ctx_word = fetch!(words, pc);
                    let callee_ctx = self.resolve_ctx(ctx_word, &regs);
                    let source = regs[rs].pl_scalar();
                    let line = unit.line_for_pc(op_pc);
                    let result = vm_try!(
                        self,
                        unit,
                        handlers,
                        pc,
                        op_pc,
                        self.eval_string(&source, &unit.pragma, callee_ctx, line)
                    );
                    regs[rd] = contextualise(result, callee_ctx);
                }

                // ----------------------------------------------------------
                // Scopes & local
                // ----------------------------------------------------------
                Opcode::RetrievePersistentScalar => {
                    let rd = fetch_reg!(words, pc);
                    let begin_id = u32::try_from(fetch!(words, pc)).expect("begin-id is non-negative");
                    let name = unit.string(fetch!(words, pc));
                    regs[rd] = Value::Scalar(self.state.persistent_scalar(begin_id, &name));
                }
                Opcode::RetrievePersistentArray => {
                    let rd = fetch_reg!(words, pc);
                    let begin_id = u32::try_from(fetch!(words, pc)).expect("begin-id is non-negative");
                    let name = unit.string(fetch!(words, pc));
                    regs[rd] = Value::Array(self.state.persistent_array(begin_id, &name));
                }
                Opcode::RetrievePersistentHash => {
                    let rd = fetch_reg!(words, pc);
                    let begin_id = u32::try_from(fetch!(words, pc)).expect("begin-id is non-negative");
                    let name = unit.string(fetch!(words, pc));
                    regs[rd] = Value::Hash(self.state.persistent_hash(begin_id, &name));
                }
                Opcode::PushLocalScalar => {
                    let rs = fetch_reg!(words, pc);
                    let target = regs[rs].pl_scalar();
                    vm_try!(self, unit, handlers, pc, op_pc, self.state.push_local_scalar(target));
                }
                Opcode::PushLocalArray => {
                    let rs = fetch_reg!(words, pc);
                    let array = vm_try!(self, unit, handlers, pc, op_pc, self.expect_array(&regs[rs]));
                    self.state.push_local_array(array);
                }
                Opcode::PushLocalHash => {
                    let rs = fetch_reg!(words, pc);
                    let hash = vm_try!(self, unit, handlers, pc, op_pc, self.expect_hash(&regs[rs]));
                    self.state.push_local_hash(hash);
                }
                Opcode::SaveLocalLevel => {
                    let rd = fetch_reg!(words, pc);
                    let level = self.state.current_level();
                    regs[rd] = Value::Scalar(Scalar::from_int(i64::try_from(level).expect("level fits i64")));
                }
                Opcode::PopToLocalLevel => {
                    let rs = fetch_reg!(words, pc);
                    let level = usize::try_from(numify(&regs[rs].pl_scalar()).as_i64().max(0))
                        .expect("level fits usize");
                    self.state.pop_to_level(level);
                }
                Opcode::PushPackage => {
                    let name = unit.string(fetch!(words, pc));
                    self.state.push_package(name);
                }
                Opcode::PopPackage => {
                    self.state.pop_package();
                }

                // ----------------------------------------------------------
                // Iterators
                // ----------------------------------------------------------
                Opcode::IterCreate => {
                    let rd = fetch_reg!(words, pc);
                    let rs = fetch_reg!(words, pc);
                    let iter = regs[rs].pl_iter();
                    regs[rd] = Value::Scalar(Scalar::from_payload(ScalarPayload::Iter(Rc::new(
                        std::cell::RefCell::new(iter),
                    ))));
                }
                Opcode::IterHasNext => {
                    let rd = fetch_reg!(words, pc);
                    let rit = fetch_reg!(words, pc);
                    let has = vm_try!(self, unit, handlers, pc, op_pc, self.with_iter(&regs[rit], |it| Ok(it.has_next())));
                    regs[rd] = Value::Scalar(Scalar::from_bool(has));
                }
                Opcode::IterNext => {
                    let rd = fetch_reg!(words, pc);
                    let rit = fetch_reg!(words, pc);
                    let next = vm_try!(self, unit, handlers, pc, op_pc, self.with_iter(&regs[rit], |it| Ok(it.next())));
                    regs[rd] = Value::Scalar(next.unwrap_or_else(Scalar::undef));
                }
                Opcode::IterNextOrJump => {
                    let rd = fetch_reg!(words, pc);
                    let rit = fetch_reg!(words, pc);
                    let target = usize::try_from(fetch!(words, pc)).expect("jump target is non-negative");
                    let next = vm_try!(self, unit, handlers, pc, op_pc, self.with_iter(&regs[rit], |it| Ok(it.next())));
                    match next {
                        // rebind, not copy: the loop variable aliases the
                        // element cell
                        Some(element) => regs[rd] = Value::Scalar(element),
                        None => pc = target,
                    }
                }

                // ----------------------------------------------------------
                // eval blocks
                // ----------------------------------------------------------
                Opcode::EvalTry => {
                    let catch_pc = usize::try_from(fetch!(words, pc)).expect("catch pc is non-negative");
                    handlers.push(Handler {
                        catch_pc,
                        dyn_level: self.state.current_level(),
                    });
                    vm_try!(self, unit, handlers, pc, op_pc, self.state.clear_error());
                }
                Opcode::EvalEnd => {
                    handlers.pop();
                    vm_try!(self, unit, handlers, pc, op_pc, self.state.clear_error());
                }
                Opcode::EvalCatch => {
                    let rd = fetch_reg!(words, pc);
                    // $@ was populated during unwinding
                    regs[rd] = Value::undef();
                }

                // ----------------------------------------------------------
                // Regex & I/O delegates
                // ----------------------------------------------------------
                Opcode::RegexQr => {
                    let rd = fetch_reg!(words, pc);
                    let rpat = fetch_reg!(words, pc);
                    let flags = unit.string(fetch!(words, pc));
                    let source = regs[rpat].pl_scalar();
                    let compiled = match source.payload() {
                        ScalarPayload::Regex(existing) => existing,
                        other => {
                            let text = stringify_payload(&other);
                            vm_try!(self, unit, handlers, pc, op_pc, compile_pattern(&text, &flags))
                        }
                    };
                    regs[rd] = Value::Scalar(Scalar::from_payload(ScalarPayload::Regex(compiled)));
                }
                Opcode::RegexMatch => {
                    let rd = fetch_reg!(words, pc);
                    let rt = fetch_reg!(words, pc);
                    let rpat = fetch_reg!(words, pc);
                    let flags = unit.string(fetch!(words, pc));
                    let ctx_word = fetch!(words, pc);
                    let want_list = self.resolve_ctx(ctx_word, &regs) == 2;
                    let target = regs[rt].pl_scalar();
                    let pattern = regs[rpat].pl_scalar();
                    let result = vm_try!(
                        self,
                        unit,
                        handlers,
                        pc,
                        op_pc,
                        regex::regex_match(self.state, &target, &pattern, &flags, want_list)
                    );
                    regs[rd] = result;
                }
                Opcode::RegexReplace => {
                    let rd = fetch_reg!(words, pc);
                    let rt = fetch_reg!(words, pc);
                    let rpat = fetch_reg!(words, pc);
                    let rrepl = fetch_reg!(words, pc);
                    let flags = unit.string(fetch!(words, pc));
                    let target = regs[rt].pl_scalar();
                    let pattern = regs[rpat].pl_scalar();
                    let replacement = regs[rrepl].pl_scalar();
                    let result = vm_try!(
                        self,
                        unit,
                        handlers,
                        pc,
                        op_pc,
                        regex::regex_replace(self.state, &target, &pattern, &replacement, &flags)
                    );
                    regs[rd] = result;
                }
                Opcode::RegexSplit => {
                    let rd = fetch_reg!(words, pc);
                    let rpat = fetch_reg!(words, pc);
                    let rt = fetch_reg!(words, pc);
                    let rlimit = fetch_reg!(words, pc);
                    let pattern = regs[rpat].pl_scalar();
                    let target = regs[rt].pl_scalar();
                    let limit = numify(&regs[rlimit].pl_scalar()).as_i64();
                    let result = vm_try!(
                        self,
                        unit,
                        handlers,
                        pc,
                        op_pc,
                        regex::regex_split(self.state, &pattern, &target, limit)
                    );
                    regs[rd] = Value::List(result);
                }
                Opcode::Print | Opcode::Say => {
                    let rh = fetch_reg!(words, pc);
                    let rlist = fetch_reg!(words, pc);
                    let mut text = String::new();
                    for s in regs[rlist].pl_list() {
                        text.push_str(&self.display_scalar(&s));
                    }
                    if op == Opcode::Say {
                        text.push('\n');
                    }
                    self.write_to_handle(&regs[rh], &text);
                }
                Opcode::Readline => {
                    let rd = fetch_reg!(words, pc);
                    let rh = fetch_reg!(words, pc);
                    let ctx_word = fetch!(words, pc);
                    let want_list = self.resolve_ctx(ctx_word, &regs) == 2;
                    let glob = vm_try!(self, unit, handlers, pc, op_pc, self.resolve_glob(&regs[rh]));
                    regs[rd] = glob.with_io(|io| match io {
                        Some(handle) => {
                            if want_list {
                                let out = List::new();
                                while let Some(line) = handle.read_line() {
                                    out.push(Scalar::from_string(line));
                                }
                                Value::List(out)
                            } else {
                                match handle.read_line() {
                                    Some(line) => Value::Scalar(Scalar::from_string(line)),
                                    None => Value::undef(),
                                }
                            }
                        }
                        None => Value::undef(),
                    });
                }
                Opcode::OpenHandle => {
                    let rd = fetch_reg!(words, pc);
                    let rh = fetch_reg!(words, pc);
                    let rargs = fetch_reg!(words, pc);
                    let args_list = regs[rargs].pl_list();
                    let opened = self.open_handle(&regs[rh], &args_list);
                    regs[rd] = Value::Scalar(Scalar::from_bool(vm_try!(self, unit, handlers, pc, op_pc, opened)));
                }
                Opcode::CloseHandle => {
                    let rd = fetch_reg!(words, pc);
                    let rh = fetch_reg!(words, pc);
                    let glob = vm_try!(self, unit, handlers, pc, op_pc, self.resolve_glob(&regs[rh]));
                    glob.set_io(None);
                    regs[rd] = Value::Scalar(Scalar::from_bool(true));
                }
                Opcode::Die => {
                    let rlist = fetch_reg!(words, pc);
                    let error = self.build_die_error(&regs[rlist]);
                    vm_try!(self, unit, handlers, pc, op_pc, Err::<(), RunError>(error));
                }
                Opcode::Warn => {
                    let rlist = fetch_reg!(words, pc);
                    let mut text = String::new();
                    for s in regs[rlist].pl_list() {
                        text.push_str(&self.display_scalar(&s));
                    }
                    if text.is_empty() {
                        text = "Warning: something's wrong".to_owned();
                    }
                    if !text.ends_with('\n') {
                        text.push_str(&format!(
                            " at {} line {}.\n",
                            unit.source_name,
                            unit.line_for_pc(op_pc)
                        ));
                    }
                    self.out.err(&text);
                }
                Opcode::Join => {
                    let rd = fetch_reg!(words, pc);
                    let rsep = fetch_reg!(words, pc);
                    let rlist = fetch_reg!(words, pc);
                    let sep = stringify(&regs[rsep].pl_scalar());
                    let parts: Vec<String> = regs[rlist].pl_list().iter().map(|s| self.display_scalar(s)).collect();
                    regs[rd] = Value::Scalar(Scalar::from_string(parts.join(&sep)));
                }
                Opcode::Sprintf => {
                    let rd = fetch_reg!(words, pc);
                    let rfmt = fetch_reg!(words, pc);
                    let rlist = fetch_reg!(words, pc);
                    let fmt = stringify(&regs[rfmt].pl_scalar());
                    let list_args = regs[rlist].pl_list();
                    let text = vm_try!(self, unit, handlers, pc, op_pc, scalar::sprintf_format(&fmt, &list_args));
                    regs[rd] = Value::Scalar(Scalar::from_string(text));
                }
                Opcode::SortList => {
                    let rd = fetch_reg!(words, pc);
                    let rcmp = fetch_reg!(words, pc);
                    let rlist = fetch_reg!(words, pc);
                    let comparator = match &regs[rcmp] {
                        Value::Code(code) => Some(code.clone()),
                        Value::Scalar(s) if !s.is_defined() => None,
                        other => Some(vm_try!(self, unit, handlers, pc, op_pc, self.resolve_callable(other))),
                    };
                    let values = regs[rlist].pl_list();
                    let line = unit.line_for_pc(op_pc);
                    let sorted = vm_try!(self, unit, handlers, pc, op_pc, self.sort_list(comparator, values, line));
                    regs[rd] = Value::List(List::from_scalars(sorted));
                }
                Opcode::Reverse => {
                    let rd = fetch_reg!(words, pc);
                    let rlist = fetch_reg!(words, pc);
                    let ctx_word = fetch!(words, pc);
                    let scalars = regs[rlist].pl_list();
                    regs[rd] = if self.resolve_ctx(ctx_word, &regs) == 1 {
                        // scalar context: concatenate, then reverse characters
                        let joined: String = scalars.iter().map(|s| stringify(s).to_string()).collect();
                        Value::Scalar(Scalar::from_string(joined.chars().rev().collect::<String>()))
                    } else {
                        let mut reversed = scalars;
                        reversed.reverse();
                        Value::List(List::from_scalars(reversed))
                    };
                }
                Opcode::Wantarray => {
                    let rd = fetch_reg!(words, pc);
                    let tag = numify(&regs[2].pl_scalar()).as_i64();
                    regs[rd] = Value::Scalar(match tag {
                        2 => Scalar::from_int(1),
                        1 => Scalar::from_int(0),
                        _ => Scalar::undef(),
                    });
                }
                Opcode::DefinedTest => {
                    let rd = fetch_reg!(words, pc);
                    let rs = fetch_reg!(words, pc);
                    let defined = regs[rs].pl_defined();
                    regs[rd] = Value::Scalar(Scalar::from_bool(defined));
                }
                Opcode::UndefOp => {
                    let rs = fetch_reg!(words, pc);
                    match &regs[rs] {
                        Value::Scalar(s) => s.set_payload(ScalarPayload::Undef),
                        Value::Array(a) => a.clear(),
                        Value::Hash(h) => {
                            let _ = h.take_contents();
                        }
                        _ => {}
                    }
                }
                Opcode::Chomp | Opcode::Chop => {
                    let rd = fetch_reg!(words, pc);
                    let rs = fetch_reg!(words, pc);
                    let target = regs[rs].pl_scalar();
                    let result = if op == Opcode::Chomp {
                        scalar::chomp(&target)
                    } else {
                        scalar::chop(&target)
                    };
                    regs[rd] = Value::Scalar(vm_try!(self, unit, handlers, pc, op_pc, result));
                }
                Opcode::AbsOp | Opcode::IntOp | Opcode::ChrOp | Opcode::OrdOp => {
                    let rd = fetch_reg!(words, pc);
                    let a = regs[fetch_reg!(words, pc)].pl_scalar();
                    let result = match op {
                        Opcode::AbsOp => scalar::abs_val(&a),
                        Opcode::IntOp => scalar::int_val(&a),
                        Opcode::ChrOp => scalar::chr_val(&a),
                        _ => scalar::ord_val(&a),
                    };
                    regs[rd] = Value::Scalar(result);
                }
                Opcode::SqrtOp => {
                    let rd = fetch_reg!(words, pc);
                    let a = regs[fetch_reg!(words, pc)].pl_scalar();
                    regs[rd] = Value::Scalar(vm_try!(self, unit, handlers, pc, op_pc, scalar::sqrt_val(&a)));
                }
                Opcode::LcOp | Opcode::UcOp => {
                    let rd = fetch_reg!(words, pc);
                    let a = regs[fetch_reg!(words, pc)].pl_scalar();
                    let text = stringify(&a);
                    let out = if op == Opcode::LcOp {
                        text.to_lowercase()
                    } else {
                        text.to_uppercase()
                    };
                    regs[rd] = Value::Scalar(Scalar::from_string(out));
                }
                Opcode::Caller => {
                    let rd = fetch_reg!(words, pc);
                    let rlevel = fetch_reg!(words, pc);
                    let level = usize::try_from(numify(&regs[rlevel].pl_scalar()).as_i64().max(0))
                        .expect("level fits usize");
                    regs[rd] = match self.state.caller_info(level) {
                        Some(frame) => {
                            let out = List::new();
                            out.push(Scalar::from_str_rc(frame.package.clone()));
                            out.push(Scalar::from_str_rc(frame.file.clone()));
                            out.push(Scalar::from_int(i64::from(frame.line)));
                            Value::List(out)
                        }
                        None => Value::empty_list(),
                    };
                }
                Opcode::PosOp => {
                    let rd = fetch_reg!(words, pc);
                    let rs = fetch_reg!(words, pc);
                    let target = regs[rs].pl_scalar();
                    regs[rd] = Value::Scalar(regex::pos_proxy(self.state, &target));
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Dispatch helpers
    // ------------------------------------------------------------------

    /// Resolves a context operand: 0..2 literal, 3 inherits this frame's
    /// context register.
    fn resolve_ctx(&self, word: i32, regs: &[Value]) -> i64 {
        match word {
            3 => numify(&regs[2].pl_scalar()).as_i64().clamp(0, 2),
            other => i64::from(other).clamp(0, 2),
        }
    }

    fn expect_array(&self, value: &Value) -> RunResult<Array> {
        match value {
            Value::Array(a) => Ok(a.clone()),
            other => Err(RunError::msg(format!(
                "Not an ARRAY value ({} found)",
                other.kind_name()
            ))),
        }
    }

    fn expect_hash(&self, value: &Value) -> RunResult<Hash> {
        match value {
            Value::Hash(h) => Ok(h.clone()),
            other => Err(RunError::msg(format!(
                "Not a HASH value ({} found)",
                other.kind_name()
            ))),
        }
    }

    fn with_iter<R>(&self, value: &Value, f: impl FnOnce(&mut ValueIter) -> RunResult<R>) -> RunResult<R> {
        let Value::Scalar(s) = value else {
            return Err(RunError::msg("iterator register does not hold an iterator"));
        };
        match s.raw_payload() {
            ScalarPayload::Iter(cell) => f(&mut cell.borrow_mut()),
            _ => Err(RunError::msg("iterator register does not hold an iterator")),
        }
    }

    /// Formats a runtime type diagnostic with the surrounding bytecode.
    fn type_error(&self, unit: &CodeUnit, pc: usize, op: Opcode, message: &str) -> RunError {
        RunError::internal(format!(
            "{message} in {op} ({} group) at pc {pc}\n{}",
            op.group_name(),
            unit.disasm_window(pc, 4)
        ))
    }

    /// Decides what to do with a control-flow marker returned by a call:
    /// jump within this frame if an enclosing loop matches, otherwise
    /// propagate it to our own caller.
    fn consume_marker(
        &mut self,
        unit: &CodeUnit,
        result: &Value,
        op_pc: usize,
        regs: &[Value],
    ) -> RunResult<Option<MarkerOutcome>> {
        let Some(marker) = result.as_flow() else {
            return Ok(None);
        };
        if marker.kind == FlowKind::Goto {
            return Ok(Some(MarkerOutcome::Propagate));
        }
        match unit.find_loop(op_pc, marker.label.as_deref()) {
            Some(entry) => {
                // restore the dynamic stack to the loop's entry watermark
                let level_reg = usize::from(entry.level_reg);
                let level = usize::try_from(numify(&regs[level_reg].pl_scalar()).as_i64().max(0))
                    .expect("level fits usize");
                self.state.pop_to_level(level);
                let target = match marker.kind {
                    FlowKind::Last => entry.last_pc,
                    FlowKind::Next => entry.next_pc,
                    FlowKind::Redo => entry.redo_pc,
                    FlowKind::Goto => unreachable!("goto handled above"),
                };
                Ok(Some(MarkerOutcome::Jump(
                    usize::try_from(target).expect("pc fits usize"),
                )))
            }
            None => Ok(Some(MarkerOutcome::Propagate)),
        }
    }

    /// Stringification that reports bless packages recorded in the state.
    fn display_scalar(&self, s: &Scalar) -> String {
        if let ScalarPayload::Ref(r) = s.payload() {
            if r.blessed.is_none() {
                if let Some(pkg) = self.state.blessing(r.target.addr()) {
                    return format!("{pkg}={}({:#x})", r.target.type_tag(), r.target.addr());
                }
            }
        }
        stringify(s).to_string()
    }

    fn build_die_error(&self, args: &Value) -> RunError {
        let scalars = args.pl_list();
        if scalars.len() == 1 {
            if let ScalarPayload::Ref(_) = scalars[0].payload() {
                // objects and references pass through $@ unchanged
                return RunError::die_value(scalars[0].copy());
            }
        }
        let mut text = String::new();
        for s in &scalars {
            text.push_str(&self.display_scalar(s));
        }
        if text.is_empty() {
            text = "Died".to_owned();
        }
        RunError::msg(text)
    }

    /// Resolves a handle operand to a glob: a glob value, a scalar holding
    /// a glob reference, or a bareword-ish name.
    fn resolve_glob(&mut self, value: &Value) -> RunResult<Glob> {
        match value {
            Value::Glob(glob) => Ok(glob.clone()),
            Value::Scalar(s) => match s.payload() {
                ScalarPayload::Ref(r) => match r.target {
                    crate::value::RefTarget::Glob(glob) => Ok(glob),
                    _ => Err(RunError::msg("Not a GLOB reference")),
                },
                ScalarPayload::Str(name) => {
                    let package = self.state.current_package();
                    let qualified = refs::qualify(&name, &package);
                    Ok(self.state.glob(&qualified))
                }
                _ => Err(RunError::msg("Bad filehandle")),
            },
            other => Err(RunError::msg(format!("Bad filehandle ({} value)", other.kind_name()))),
        }
    }

    /// Writes to stdout, stderr, or a glob's attached file handle.
    fn write_to_handle(&mut self, handle: &Value, text: &str) {
        // undef means the default output handle
        if let Value::Scalar(s) = handle {
            if !s.is_defined() {
                self.out.out(text);
                return;
            }
        }
        match self.resolve_glob(handle) {
            Ok(glob) => {
                let name = glob.name();
                if &*name == "main::STDERR" {
                    self.out.err(text);
                } else if &*name == "main::STDOUT" {
                    self.out.out(text);
                } else {
                    let wrote = glob.with_io(|io| match io {
                        Some(h) => {
                            h.write_str(text);
                            true
                        }
                        None => false,
                    });
                    if !wrote {
                        self.out.out(text);
                    }
                }
            }
            Err(_) => self.out.out(text),
        }
    }

    /// `open`: attach a file handle to the target glob, autovivifying a
    /// scalar target into a glob reference. Failure sets `$!` and returns
    /// false.
    fn open_handle(&mut self, target: &Value, args: &[Scalar]) -> RunResult<bool> {
        if args.len() != 2 {
            return Err(RunError::msg("only 3-argument open is supported"));
        }
        let mode = stringify(&args[0]);
        let path = stringify(&args[1]);
        let glob = match target {
            Value::Glob(glob) => glob.clone(),
            Value::Scalar(s) => match s.payload() {
                ScalarPayload::Ref(r) => match r.target {
                    crate::value::RefTarget::Glob(glob) => glob,
                    _ => return Err(RunError::msg("Not a GLOB reference")),
                },
                _ => {
                    // `open(my $fh, ...)`: bind a fresh anonymous glob
                    let glob = Glob::new(Rc::from("main::__ANONIO__"));
                    let reference = Value::Glob(glob.clone()).pl_make_ref();
                    s.assign_payload(reference.raw_payload())?;
                    glob
                }
            },
            other => return Err(RunError::msg(format!("Bad filehandle ({} value)", other.kind_name()))),
        };
        match IoHandle::open(&mode, std::path::Path::new(&*path)) {
            Ok(handle) => {
                glob.set_io(Some(handle));
                Ok(true)
            }
            Err(e) => {
                self.state.set_errno(&e.to_string())?;
                Ok(false)
            }
        }
    }
}

/// What becomes of a marker observed at a call site.
enum MarkerOutcome {
    Jump(usize),
    Propagate,
}

/// Shapes a call result for the caller's context: discarded in void,
/// collapsed to a scalar in scalar context, flattened in list context.
fn contextualise(result: Value, ctx_tag: i64) -> Value {
    match ctx_tag {
        0 => Value::empty_list(),
        1 => Value::Scalar(result.pl_scalar()),
        _ => match result {
            list @ Value::List(_) => list,
            other => Value::List(List::from_scalars(other.pl_list())),
        },
    }
}

/// Instantiates a constant-pool template as a runtime value.
fn constant_to_value(constant: &Constant) -> Value {
    match constant {
        Constant::Undef => Value::undef(),
        Constant::Int(v) => Value::Scalar(Scalar::from_int(*v)),
        Constant::Num(v) => Value::Scalar(Scalar::from_num(*v)),
        Constant::Str(s) => Value::Scalar(Scalar::from_str_rc(Rc::clone(s))),
        Constant::Range(r) => Value::Range(Rc::clone(r)),
        Constant::List(items) => {
            let list = List::new();
            for item in items {
                for s in constant_to_value(item).pl_list() {
                    list.push(s);
                }
            }
            Value::List(list)
        }
        Constant::Unit(unit) => Value::Code(Code::new(Rc::clone(unit), Vec::new(), unit.name.clone())),
    }
}

fn ordering_to_int(ordering: std::cmp::Ordering) -> i64 {
    match ordering {
        std::cmp::Ordering::Less => -1,
        std::cmp::Ordering::Equal => 0,
        std::cmp::Ordering::Greater => 1,
    }
}

fn compare_result(op: Opcode, ordering: std::cmp::Ordering) -> bool {
    use std::cmp::Ordering::{Equal, Greater, Less};
    match op {
        Opcode::NumEq | Opcode::StrEq => ordering == Equal,
        Opcode::NumNe | Opcode::StrNe => ordering != Equal,
        Opcode::NumLt | Opcode::StrLt => ordering == Less,
        Opcode::NumGt | Opcode::StrGt => ordering == Greater,
        Opcode::NumLe | Opcode::StrLe => ordering != Greater,
        _ => ordering != Less,
    }
}

/// Negative list indexes count from the end, as in Perl.
fn resolve_list_index(index: i64, len: usize) -> Option<usize> {
    if index >= 0 {
        return Some(usize::try_from(index).expect("non-negative index fits usize"));
    }
    let len = i64::try_from(len).expect("length fits i64");
    let adjusted = len + index;
    if adjusted < 0 {
        None
    } else {
        Some(usize::try_from(adjusted).expect("adjusted index fits usize"))
    }
}

/// Builds a range from two endpoint scalars: numeric when both endpoints
/// look fully numeric, magic string range otherwise.
fn make_range(a: &Scalar, b: &Scalar) -> RangeValue {
    let numeric = |s: &Scalar| match s.payload() {
        ScalarPayload::Int(_) | ScalarPayload::Num(_) | ScalarPayload::Undef => true,
        ScalarPayload::Str(text) => {
            let trimmed = text.trim();
            !trimmed.is_empty() && trimmed.parse::<f64>().is_ok()
        }
        _ => false,
    };
    if numeric(a) && numeric(b) {
        RangeValue::Int {
            start: numify(a).as_i64(),
            end: numify(b).as_i64(),
        }
    } else {
        RangeValue::Str {
            start: stringify(a),
            end: stringify(b),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn list_index_resolution() {
        assert_eq!(resolve_list_index(0, 3), Some(0));
        assert_eq!(resolve_list_index(-1, 3), Some(2));
        assert_eq!(resolve_list_index(-4, 3), None);
        assert_eq!(resolve_list_index(9, 3), Some(9));
    }

    #[test]
    fn range_shape_detection() {
        let r = make_range(&Scalar::from_int(1), &Scalar::from_string("10"));
        assert_eq!(r, RangeValue::Int { start: 1, end: 10 });
        let r = make_range(&Scalar::from_string("aa"), &Scalar::from_string("ad"));
        match r {
            RangeValue::Str { start, end } => {
                assert_eq!(&*start, "aa");
                assert_eq!(&*end, "ad");
            }
            other => panic!("expected string range, got {other:?}"),
        }
    }

    #[test]
    fn constants_instantiate_fresh_scalars() {
        let c = Constant::Int(5);
        let v1 = constant_to_value(&c);
        let v2 = constant_to_value(&c);
        let (Value::Scalar(s1), Value::Scalar(s2)) = (&v1, &v2) else {
            panic!("expected scalars");
        };
        assert!(!s1.same_cell(s2));
    }
}
