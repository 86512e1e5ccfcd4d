//! Run an extraction over local files without the HTTP server.
//!
//! Usage: `extract_files <field,field,...> <file-or-dir>... [--csv]`
//!
//! CSV output starts with a `document` column naming each row's file.

use anyhow::{Result, bail};
use std::path::PathBuf;

use api::{AppConfig, logging};
use extract::{FieldSchema, RunResult};
use ingest::FileReader;

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let as_csv = match args.iter().position(|a| a == "--csv") {
        Some(i) => {
            args.remove(i);
            true
        }
        None => false,
    };

    if args.len() < 2 {
        bail!("Usage: extract_files <field,field,...> <file-or-dir>... [--csv]");
    }

    let schema = FieldSchema::from_names_lenient(args[0].split(','))?;

    let mut documents = Vec::new();
    for arg in &args[1..] {
        let path = PathBuf::from(arg);
        if path.is_dir() {
            documents.extend(FileReader::read_directory(&path).await?);
        } else {
            documents.push(FileReader::read_file(&path).await?);
        }
    }

    let config = AppConfig::from_env()?;
    let adapter = extract::build_adapter(config.pipeline.clone(), &config.remote)?;
    let result = adapter.run(documents, schema, config.api_key.clone()).await?;

    if as_csv {
        print!("{}", result.to_csv_with_documents()?);
    } else {
        print_logs(&result);
        println!("{}", serde_json::to_string_pretty(&result)?);
    }

    Ok(())
}

fn print_logs(result: &RunResult) {
    for line in &result.logs {
        eprintln!("{}", line);
    }
}
