use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::RiaConfig;
use crate::facade::Ria;
use crate::{ExecStatus, RiaError, RiaResult, now_string, runtime, sha256_hex};

#[derive(Debug, Serialize)]
pub struct RunReport {
    pub script: String,
    pub script_sha256: String,
    pub timestamp: String,
    pub temp_dir: String,
    pub executions: Vec<ExecutionRecord>,
}

#[derive(Debug, Serialize)]
pub struct ExecutionRecord {
    pub entry: String,
    pub status: ExecStatus,
    pub result: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: u128,
}

pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> RiaResult<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| RiaError::io(format!("create {}", dir.display()), e))?;
    }
    let json = serde_json::to_vec_pretty(value).map_err(|e| RiaError::Message(e.to_string()))?;
    std::fs::write(path, json).map_err(|e| RiaError::io(format!("write {}", path.display()), e))
}

/// Load `script` into a fresh engine and run the entries in order, `repeat`
/// times over, all with the same parameters. Globals carry over between runs.
pub fn run(
    config: RiaConfig,
    script: PathBuf,
    entries: Vec<String>,
    params: Vec<String>,
    repeat: usize,
    temp_dir: Option<PathBuf>,
    json_out: Option<PathBuf>,
) -> RiaResult<()> {
    let source = std::fs::read(&script).map_err(|e| RiaError::io(format!("read {}", script.display()), e))?;
    let runtime = runtime::bootstrap(config);
    let temp_dir = temp_dir.unwrap_or_else(|| runtime.config().temp_dir.clone());

    let mut ria = Ria::native();
    let handle = ria.initialize(&temp_dir)?;
    info!(%handle, script = %script.display(), "loading script");
    if let Err(e) = ria.load_script(&script, handle) {
        let _ = ria.shutdown(handle);
        return Err(e);
    }

    let params: Vec<&str> = params.iter().map(String::as_str).collect();
    let repeat = repeat.max(1);
    let mut executions = Vec::with_capacity(entries.len() * repeat);
    for entry in std::iter::repeat_n(&entries, repeat).flatten() {
        let start = Instant::now();
        let outcome = ria.execute(entry, Some(params.as_slice()), handle);
        let elapsed_ms = start.elapsed().as_millis();
        let error = match outcome {
            Ok(value) => {
                println!("{entry}: {value}");
                None
            }
            Err(e) => {
                warn!(entry = entry.as_str(), error = %e, "execute failed");
                println!("{entry}: FAILED ({e})");
                Some(ria.last_error_message(handle).unwrap_or_else(|_| e.to_string()))
            }
        };
        executions.push(ExecutionRecord {
            entry: entry.clone(),
            status: ria.status,
            result: ria.result.clone(),
            error,
            elapsed_ms,
        });
    }
    ria.shutdown(handle)?;

    if let Some(path) = json_out {
        let report = RunReport {
            script: script.display().to_string(),
            script_sha256: sha256_hex(&source),
            timestamp: now_string(),
            temp_dir: temp_dir.display().to_string(),
            executions,
        };
        write_json(&path, &report)?;
        info!(path = %path.display(), "wrote run report");
    }
    Ok(())
}
