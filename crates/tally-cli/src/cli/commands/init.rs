use crate::cli::args::InitArgs;
use crate::exit_codes;
use crate::templates;
use std::path::Path;

pub fn run(args: InitArgs) -> anyhow::Result<i32> {
    println!("🏗️  Writing sample config under {}", args.dir.display());
    let files = [
        ("models/fake.yaml", templates::FAKE_MODEL_YAML),
        ("models/ollama.yaml", templates::OLLAMA_MODEL_YAML),
        ("prompts/basic.yaml", templates::BASIC_PROMPTS_YAML),
        ("evaluation.yaml", templates::EVALUATION_YAML),
    ];
    for (rel, content) in files {
        write_file_if_missing(&args.dir.join(rel), content)?;
    }
    println!(
        "✅  Initialization complete. Put ground_truth.csv and images/ under {}/data, then run 'tally validate --data-dir {}/data'.",
        args.dir.display(),
        args.dir.display()
    );
    Ok(exit_codes::OK)
}

fn write_file_if_missing(path: &Path, content: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| anyhow::anyhow!("failed to create {}: {}", parent.display(), e))?;
    }
    if !path.exists() {
        std::fs::write(path, content)
            .map_err(|e| anyhow::anyhow!("failed to write {}: {}", path.display(), e))?;
        println!("   Created {}", path.display());
    } else {
        println!("   Skipped {} (exists)", path.display());
    }
    Ok(())
}
