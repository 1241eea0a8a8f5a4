//! Stack machine that runs one entry point of a compiled [`Module`].

use std::cmp::Ordering;

use tracing::trace;

use super::builtins::Host;
use super::module::{BinOp, Module, Op, Slot, UnOp};
use super::value::Value;
use crate::{RiaError, RiaResult};

#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub max_steps: u64,
    pub max_result_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits { max_steps: 1_000_000, max_result_bytes: 511 }
    }
}

/// Variables shared by every execute of a loaded module.
#[derive(Debug, Clone, Default)]
pub struct Globals(Vec<Option<Value>>);

impl Globals {
    pub fn for_module(module: &Module) -> Self {
        Globals(vec![None; module.globals.len()])
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.0.get(index).and_then(Option::as_ref)
    }
}

struct Frame<'a> {
    locals: Vec<Option<Value>>,
    params: &'a [String],
    globals: &'a mut Globals,
}

impl Frame<'_> {
    fn read(&self, slot: Slot) -> Option<&Value> {
        match slot {
            Slot::Local(i) => self.locals.get(i as usize)?.as_ref(),
            Slot::Global(i) => self.globals.get(i as usize),
        }
    }

    fn write(&mut self, slot: Slot, value: Value) -> Result<(), String> {
        let cell = match slot {
            Slot::Local(i) => self.locals.get_mut(i as usize),
            Slot::Global(i) => self.globals.0.get_mut(i as usize),
        };
        let cell = cell.ok_or_else(|| format!("bad variable slot {slot:?}"))?;
        *cell = Some(value);
        Ok(())
    }
}

/// Run `entry` and return its result text (empty when it returns nothing).
pub fn run(
    module: &Module,
    entry: &str,
    params: &[String],
    globals: &mut Globals,
    host: &mut Host,
    limits: &Limits,
) -> RiaResult<String> {
    let info = module.entry(entry).ok_or_else(|| RiaError::UnknownEntry(entry.to_string()))?;
    if params.len() < info.params as usize {
        return Err(RiaError::Arity {
            entry: info.name.clone(),
            expected: info.params as usize,
            given: params.len(),
        });
    }
    let fail = |pos: usize, message: String| RiaError::Execution { entry: info.name.clone(), pos, message };

    let mut frame = Frame { locals: vec![None; info.locals as usize], params, globals };
    let mut stack: Vec<Value> = Vec::new();
    let mut pc = info.start as usize;
    let mut steps = 0u64;

    loop {
        steps += 1;
        if steps > limits.max_steps {
            return Err(fail(pc, "instruction budget exhausted".into()));
        }
        let at = pc;
        let op = module.code.get(pc).ok_or_else(|| fail(at, "instruction pointer out of range".into()))?;
        pc += 1;
        trace!(pc = at, ?op, "step");
        match op {
            Op::PushVar(slot) => {
                let value = frame.read(*slot).cloned().ok_or_else(|| fail(at, "use of uninitialized variable".into()))?;
                stack.push(value);
            }
            Op::PushStr(index) => {
                let s = module.string(*index).ok_or_else(|| fail(at, format!("bad string index {index}")))?;
                stack.push(Value::Str(s.to_string()));
            }
            Op::PushInt(n) => stack.push(Value::Int(*n)),
            Op::PushParam(n) => {
                let p = frame.params.get(*n as usize).ok_or_else(|| fail(at, format!("parameter @{n} is missing")))?;
                stack.push(Value::Str(p.clone()));
            }
            Op::Call { builtin, argc, keep, out } => {
                let argc = *argc as usize;
                if stack.len() < argc {
                    return Err(fail(at, "stack underflow".into()));
                }
                let args = stack.split_off(stack.len() - argc);
                let output = host.call(*builtin, args).map_err(|e| fail(at, e.to_string()))?;
                if let (Some(slot), Some(position)) = (out, output.position) {
                    frame.write(*slot, Value::Int(position)).map_err(|m| fail(at, m))?;
                }
                if *keep {
                    let value = output.value.ok_or_else(|| fail(at, "function returns no value".into()))?;
                    stack.push(value);
                }
            }
            Op::Unary(op) => {
                let v = pop(&mut stack).map_err(|m| fail(at, m))?;
                stack.push(unary(*op, v).map_err(|m| fail(at, m))?);
            }
            Op::Binary(op) => {
                let rhs = pop(&mut stack).map_err(|m| fail(at, m))?;
                let lhs = pop(&mut stack).map_err(|m| fail(at, m))?;
                stack.push(binary(*op, lhs, rhs).map_err(|m| fail(at, m))?);
            }
            Op::Store(slot) => {
                let v = pop(&mut stack).map_err(|m| fail(at, m))?;
                frame.write(*slot, v).map_err(|m| fail(at, m))?;
            }
            Op::JumpIfFalse(target) => match pop(&mut stack).map_err(|m| fail(at, m))? {
                Value::Bool(true) => {}
                Value::Bool(false) => pc = *target as usize,
                _ => return Err(fail(at, "condition is not boolean".into())),
            },
            Op::Jump(target) => pc = *target as usize,
            Op::Ret => {
                let text = pop(&mut stack).map_err(|m| fail(at, m))?.into_text();
                if text.len() > limits.max_result_bytes {
                    return Err(fail(
                        at,
                        format!("result of {} bytes exceeds the {} byte limit", text.len(), limits.max_result_bytes),
                    ));
                }
                return Ok(text);
            }
            Op::RetNone => return Ok(String::new()),
        }
    }
}

fn pop(stack: &mut Vec<Value>) -> Result<Value, String> {
    stack.pop().ok_or_else(|| "stack underflow".to_string())
}

fn unary(op: UnOp, v: Value) -> Result<Value, String> {
    match (op, v) {
        (UnOp::Neg, Value::Int(n)) => Ok(Value::Int(n.wrapping_neg())),
        (UnOp::BitNot, Value::Int(n)) => Ok(Value::Int(!n)),
        (UnOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        _ => Err("bad operands type".into()),
    }
}

fn compare(op: BinOp, ord: Ordering) -> bool {
    match op {
        BinOp::Lt => ord == Ordering::Less,
        BinOp::Gt => ord == Ordering::Greater,
        BinOp::Le => ord != Ordering::Greater,
        _ => ord != Ordering::Less,
    }
}

fn binary(op: BinOp, lhs: Value, rhs: Value) -> Result<Value, String> {
    use Value::{Bool, Int, Str};
    let v = match (op, lhs, rhs) {
        (BinOp::Eq, a, b) => Bool(a == b),
        (BinOp::Ne, a, b) => Bool(a != b),
        (BinOp::Add, Int(a), Int(b)) => Int(a.wrapping_add(b)),
        (BinOp::Add, Str(a), Str(b)) => Str(a + &b),
        (BinOp::Sub, Int(a), Int(b)) => Int(a.wrapping_sub(b)),
        (BinOp::Mul, Int(a), Int(b)) => Int(a.wrapping_mul(b)),
        (BinOp::Div | BinOp::Rem, Int(_), Int(0)) => return Err("division by zero".into()),
        (BinOp::Div, Int(a), Int(b)) => Int(a.wrapping_div(b)),
        (BinOp::Rem, Int(a), Int(b)) => Int(a.wrapping_rem(b)),
        (BinOp::BitAnd, Int(a), Int(b)) => Int(a & b),
        (BinOp::BitOr, Int(a), Int(b)) => Int(a | b),
        (BinOp::Xor, Int(a), Int(b)) => Int(a ^ b),
        (BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge, Int(a), Int(b)) => Bool(compare(op, a.cmp(&b))),
        (BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge, Str(a), Str(b)) => Bool(compare(op, a.cmp(&b))),
        (BinOp::And, Bool(a), Bool(b)) => Bool(a && b),
        (BinOp::Or, Bool(a), Bool(b)) => Bool(a || b),
        _ => return Err("bad operands type".into()),
    };
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{CannedTransport, HttpSession};
    use crate::script::compile;

    struct Harness {
        module: Module,
        globals: Globals,
        host: Host,
        _dir: tempfile::TempDir,
    }

    impl Harness {
        fn new(src: &str) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let module = compile(src).unwrap();
            let globals = Globals::for_module(&module);
            let host = Host::new(dir.path().to_path_buf(), HttpSession::new(CannedTransport::new().factory()));
            Harness { module, globals, host, _dir: dir }
        }

        fn run(&mut self, entry: &str, params: &[&str]) -> RiaResult<String> {
            let params: Vec<String> = params.iter().map(|p| p.to_string()).collect();
            run(&self.module, entry, &params, &mut self.globals, &mut self.host, &Limits::default())
        }
    }

    #[test]
    fn test_left_to_right_evaluation() {
        let mut h = Harness::new("a(0){ return 2 + 3 * 4; } b(0){ return 2 + (3 * 4); } c(0){ return -5 - 1; }");
        assert_eq!(h.run("a", &[]).unwrap(), "20");
        assert_eq!(h.run("b", &[]).unwrap(), "14");
        assert_eq!(h.run("c", &[]).unwrap(), "-6");
    }

    #[test]
    fn test_params_and_concat() {
        let mut h = Harness::new("greet(2){ return \"Hello, \" + @0 + \" and \" + @1; }");
        assert_eq!(h.run("GREET", &["A", "B"]).unwrap(), "Hello, A and B");
        assert!(matches!(h.run("greet", &["A"]), Err(RiaError::Arity { expected: 2, given: 1, .. })));
    }

    #[test]
    fn test_missing_param_is_runtime_error() {
        let mut h = Harness::new("a(0){ return @3; }");
        let err = h.run("a", &["x"]).unwrap_err();
        assert!(err.to_string().contains("parameter @3 is missing"), "{err}");
    }

    #[test]
    fn test_globals_persist_locals_reset() {
        let src = r#"
global($count:int)
init(0) { $count = 0; }
bump(0) {
    $count = $count + 1;
    $local = 10;
    return $count;
}
"#;
        let mut h = Harness::new(src);
        h.run("init", &[]).unwrap();
        assert_eq!(h.run("bump", &[]).unwrap(), "1");
        assert_eq!(h.run("bump", &[]).unwrap(), "2");
        assert_eq!(h.globals.get(0), Some(&Value::Int(2)));
    }

    #[test]
    fn test_uninitialized_global_fails_at_runtime() {
        let mut h = Harness::new("global($g:string) a(0){ return $g; }");
        let err = h.run("a", &[]).unwrap_err();
        assert!(err.to_string().contains("use of uninitialized variable"));
    }

    #[test]
    fn test_while_and_if_else() {
        let src = r#"
count(1) {
    $n = string_to_int(@0);
    $i = 0;
    $out = "";
    while ($i < $n) {
        if (($i % 2) == 0) { $out = $out + "e"; } else { $out = $out + "o"; }
        $i = $i + 1;
    }
    return $out;
}
"#;
        let mut h = Harness::new(src);
        assert_eq!(h.run("count", &["5"]).unwrap(), "eoeoe");
        assert_eq!(h.run("count", &["0"]).unwrap(), "");
    }

    #[test]
    fn test_extract_loop_updates_position_variable() {
        let src = r#"
all(1) {
    $pos = 0;
    $out = "";
    $item = extract_string(@0, $pos, "<i>", "</i>");
    while ($item != "") {
        $out = $out + $item + ";";
        $item = extract_string(@0, $pos, "<i>", "</i>");
    }
    return $out;
}
"#;
        let mut h = Harness::new(src);
        assert_eq!(h.run("all", &["<i>a</i> <i>b</i> <I>c</I>"]).unwrap(), "a;b;c;");
    }

    #[test]
    fn test_runtime_errors_carry_position() {
        let mut h = Harness::new("a(0){ $z = 0; return 1 / $z; }");
        match h.run("a", &[]).unwrap_err() {
            RiaError::Execution { entry, message, pos } => {
                assert_eq!(entry, "a");
                assert_eq!(message, "division by zero");
                assert!(pos > 0);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_step_budget() {
        let mut h = Harness::new("spin(0){ $t = 1; while ($t == 1) { } }");
        let params: Vec<String> = Vec::new();
        let limits = Limits { max_steps: 1_000, ..Limits::default() };
        let err = run(&h.module, "spin", &params, &mut h.globals, &mut h.host, &limits).unwrap_err();
        assert!(err.to_string().contains("instruction budget exhausted"));
    }

    #[test]
    fn test_result_limit_and_value_text() {
        let mut h = Harness::new("big(1){ return @0; } flag(0){ return 1 < 2; } none(0){ }");
        let long = "x".repeat(600);
        assert!(h.run("big", &[long.as_str()]).is_err());
        assert_eq!(h.run("big", &["ok"]).unwrap(), "ok");
        assert_eq!(h.run("flag", &[]).unwrap(), "true");
        assert_eq!(h.run("none", &[]).unwrap(), "");
        assert!(matches!(h.run("missing", &[]), Err(RiaError::UnknownEntry(_))));
    }
}
