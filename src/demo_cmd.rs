use std::path::{Path, PathBuf};

use tracing::info;

use crate::binding::RiaBinding;
use crate::engine::ScriptEngine;
use crate::{RiaError, RiaResult};

/// Drive `binding` through the city listing session and return the text a
/// host screen would show: three city URLs, one per line, then the engine's
/// last error text. Return values are not checked.
pub fn afisha_session<E: ScriptEngine>(binding: &mut RiaBinding<E>, temp_dir: &str, script: &str) -> String {
    let mut screen = String::new();
    let engine = binding.init(temp_dir);
    binding.load(script, engine);
    binding.execute("query_cities", None, engine);
    for _ in 0..3 {
        binding.execute("get_next_city_url", None, engine);
        screen.push_str(&binding.result);
        screen.push('\n');
    }
    screen.push_str(&binding.error_msg(engine));
    binding.shutdown(engine);
    screen
}

pub fn run(script: PathBuf, temp_dir: Option<PathBuf>) -> RiaResult<()> {
    // keeps the scratch directory alive until the session ends
    let scratch;
    let dir: &Path = match &temp_dir {
        Some(dir) => dir,
        None => {
            scratch = tempfile::tempdir().map_err(|e| RiaError::io("create temp dir", e))?;
            scratch.path()
        }
    };
    info!(temp_dir = %dir.display(), script = %script.display(), "starting demo session");
    let mut binding = RiaBinding::native();
    let screen = afisha_session(&mut binding, &dir.to_string_lossy(), &script.to_string_lossy());
    print!("{screen}");
    if !screen.ends_with('\n') {
        println!();
    }
    Ok(())
}
