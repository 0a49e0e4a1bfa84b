/// Model file auto-download from HuggingFace.
///
/// Fetches the ONNX export and tokenizer of a sentence-transformers model
/// into the local model directory, skipping files already present.
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

/// HuggingFace organisation hosting the sentence-transformers models.
const HF_ORG: &str = "sentence-transformers";

/// Files required for the embedder, with their path inside the model repo.
const MODEL_FILES: &[(&str, &str)] = &[
    ("model.onnx", "onnx/model.onnx"),
    ("tokenizer.json", "tokenizer.json"),
    ("config.json", "config.json"),
];

/// Check whether all required model files exist in `model_dir`.
#[must_use]
pub fn all_files_present(model_dir: &Path) -> bool {
    MODEL_FILES
        .iter()
        .all(|(name, _)| model_dir.join(name).exists())
}

fn file_url(model_name: &str, repo_path: &str) -> String {
    format!("https://huggingface.co/{HF_ORG}/{model_name}/resolve/main/{repo_path}")
}

/// Download missing model files for `model_name` into `model_dir`.
pub fn download_model_files(model_dir: &Path, model_name: &str) -> Result<()> {
    fs::create_dir_all(model_dir)
        .with_context(|| format!("failed to create model directory: {}", model_dir.display()))?;

    if all_files_present(model_dir) {
        info!("All model files found in {}", model_dir.display());
        return Ok(());
    }

    info!("Downloading {model_name} from HuggingFace (one-time, ~90MB)");

    for &(filename, repo_path) in MODEL_FILES {
        let dest = model_dir.join(filename);
        if dest.exists() {
            continue;
        }

        info!("Downloading {filename}...");
        download_file(&dest, &file_url(model_name, repo_path))
            .with_context(|| format!("failed to download {filename}"))?;
    }

    info!("Model download complete");
    Ok(())
}

/// Stream one file to disk behind a progress bar.
///
/// Writes to a `.part` file first so an interrupted download is retried.
fn download_file(dest: &Path, url: &str) -> Result<()> {
    let mut resp =
        reqwest::blocking::get(url).with_context(|| format!("HTTP request failed: {url}"))?;

    if !resp.status().is_success() {
        anyhow::bail!("bad status: {} for {url}", resp.status());
    }

    let pb = match resp.content_length() {
        Some(total) if total > 0 => {
            let pb = ProgressBar::new(total);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("  {bar:40.cyan/blue} {percent}% ({bytes}/{total_bytes})")
            {
                pb.set_style(style.progress_chars("█▓░"));
            }
            pb
        }
        _ => ProgressBar::new_spinner(),
    };

    let partial = dest.with_extension("part");
    let file = fs::File::create(&partial)
        .with_context(|| format!("failed to create file: {}", partial.display()))?;
    let mut writer = pb.wrap_write(file);

    resp.copy_to(&mut writer)
        .context("failed to read response body")?;
    pb.finish_and_clear();

    fs::rename(&partial, dest)
        .with_context(|| format!("failed to move {} into place", partial.display()))?;
    Ok(())
}
