//! `acctest classify` - show how an error code is treated

use anyhow::{Result, bail};
use colored::Colorize;
use lifecycle::{ClassifierTable, ErrorClass, ErrorClassifier};
use std::process::ExitCode;

use crate::cli::ClassifyArgs;
use crate::suite::Suite;
use crate::ui;

pub fn run(args: &ClassifyArgs) -> Result<ExitCode> {
    let table = table_for(args)?;
    let classifier = ErrorClassifier::from_table(&table)?;
    let class = classifier.classify_code(&args.code);

    let label = match class {
        ErrorClass::NotFound => class.to_string().green(),
        ErrorClass::Transient => class.to_string().yellow(),
        ErrorClass::Fatal => class.to_string().red(),
    };
    println!("{} {} {}", args.code.bold(), "→".dimmed(), label);
    ui::kv("provider", &args.provider);
    ui::kv("meaning", class.description());
    ui::kv("advice", class.advice());

    Ok(ExitCode::SUCCESS)
}

fn table_for(args: &ClassifyArgs) -> Result<ClassifierTable> {
    if let Some(path) = &args.suite {
        let suite = Suite::load(path)?;
        if let Some(table) = suite.file.provider.get(&args.provider) {
            return Ok(table.clone());
        }
    }

    let Some(table) = ClassifierTable::builtin(&args.provider) else {
        bail!(
            "Cannot classify {}: no classifier table for provider {}",
            args.code,
            args.provider
        );
    };
    Ok(table)
}
