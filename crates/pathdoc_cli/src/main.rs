//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `pathdoc_core` linkage, storage bootstrap and rendering.
//! - Keep output deterministic for quick local sanity checks.
//!
//! Usage: `pathdoc_cli [config.json]`. `PATHDOC_*` variables override the
//! file; without a config the sample lives in memory.

use log::info;
use pathdoc_core::{
    init_logging, open_db, open_db_in_memory, CoreConfig, DocumentService, SqliteNodeStore,
};
use serde_json::json;
use std::error::Error;
use std::process::ExitCode;

fn main() -> ExitCode {
    println!("pathdoc_core ping={}", pathdoc_core::ping());
    println!("pathdoc_core version={}", pathdoc_core::core_version());

    match run(std::env::args().nth(1)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("pathdoc_cli error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(config_path: Option<String>) -> Result<(), Box<dyn Error>> {
    let config = match config_path {
        Some(path) => CoreConfig::from_json_file(path)?.with_env_overrides(),
        None => CoreConfig {
            db_path: None,
            ..CoreConfig::default()
        }
        .with_env_overrides(),
    };
    if let Some(log_dir) = &config.log_dir {
        init_logging(&config.log_level, log_dir)?;
    }

    let conn = match &config.db_path {
        Some(path) => open_db(path)?,
        None => open_db_in_memory()?,
    };
    let service = DocumentService::open(SqliteNodeStore::try_new(&conn)?)?;

    let document = service.import_document(&json!({
        "markup": "document",
        "children": [
            { "markup": "paragraph", "children": [
                { "markup": "text", "content": "Hello from pathdoc" }
            ]}
        ]
    }))?;
    let root_id = document.id().clone();
    service.set(&root_id, "1", "list")?;
    service.set(&root_id, "1/0", "item")?;
    service.set(&root_id, "1/0/0", "text")?;
    service.set(&root_id, "1/0/0/content", "first item")?;

    let roots = service.registry().list_roots().len();
    info!("event=cli_smoke module=cli status=ok roots={roots}");
    println!("pathdoc_core roots={roots}");
    print!("{}", service.render(&root_id)?);
    Ok(())
}
