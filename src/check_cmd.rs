use std::path::PathBuf;

use tracing::info;

use crate::run_cmd::write_json;
use crate::script::{self, Module};
use crate::{RiaError, RiaResult};

/// Compile `script` without running it and print what it defines.
pub fn run(script: PathBuf, dump: Option<PathBuf>) -> RiaResult<()> {
    let source = std::fs::read_to_string(&script)
        .map_err(|e| RiaError::io(format!("cannot open script file {}", script.display()), e))?;
    let module = script::compile(&source)?;
    print!("{}", describe(&module));
    if let Some(path) = dump {
        write_json(&path, &module)?;
        info!(path = %path.display(), "wrote compiled module");
    }
    Ok(())
}

fn describe(module: &Module) -> String {
    let mut out = String::new();
    for entry in &module.entries {
        out.push_str(&format!("entry {}({})\n", entry.name, entry.params));
    }
    for global in &module.globals {
        match global.ty {
            Some(ty) => out.push_str(&format!("global ${}: {ty}\n", global.name)),
            None => out.push_str(&format!("global ${}\n", global.name)),
        }
    }
    out.push_str(&format!("{} instructions, {} strings\n", module.code.len(), module.strings.len()));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_lists_entries_and_globals() {
        let module = script::compile("global($n:int) Next(2) { return @1; }").unwrap();
        let text = describe(&module);
        assert!(text.contains("entry next(2)"));
        assert!(text.contains("global $n: int"));
    }

    #[test]
    fn test_check_reports_compile_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.scr");
        std::fs::write(&path, "a(0){ $x = 1 }").unwrap();
        let err = run(path, None).unwrap_err();
        assert!(matches!(err, RiaError::Compile { .. }));
    }

    #[test]
    fn test_check_dumps_module() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ok.scr");
        std::fs::write(&path, "a(0){ return \"x\"; }").unwrap();
        let dump = dir.path().join("a.json");
        run(path, Some(dump.clone())).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&std::fs::read(dump).unwrap()).unwrap();
        assert_eq!(value["entries"][0]["name"], "a");
    }
}
