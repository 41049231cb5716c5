//! `acctest validate` - check suites without creating anything

use anyhow::{Result, bail};
use std::path::PathBuf;
use std::process::ExitCode;

use crate::Context;
use crate::suite;
use crate::ui;

pub fn run(ctx: &Context, paths: &[PathBuf]) -> Result<ExitCode> {
    let files = suite::discover(paths)?;
    if files.is_empty() {
        bail!("No suite files found");
    }

    let mut invalid = 0;
    for path in &files {
        let checked = suite::Suite::load(path).and_then(|s| s.validate().map(|()| s));
        match checked {
            Ok(s) => {
                if !ctx.quiet {
                    ui::success(&format!(
                        "{} ({} kinds, {} cases)",
                        path.display(),
                        s.file.kinds.len(),
                        s.file.cases.len()
                    ));
                }
            }
            Err(e) => {
                invalid += 1;
                ui::error(&format!("{e:#}"));
            }
        }
    }

    Ok(if invalid == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
