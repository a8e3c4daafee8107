/// Fetches the multilingual-e5-small model files from HuggingFace.
///
/// Each file is downloaded to a temporary name and renamed into place, so an
/// interrupted download is fetched again on the next start.
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

/// Name of the model the files below belong to.
pub const MODEL_NAME: &str = "multilingual-e5-small";

const HF_BASE: &str = "https://huggingface.co/intfloat/multilingual-e5-small/resolve/main";

/// Local file name and path under [`HF_BASE`].
const MODEL_FILES: &[(&str, &str)] = &[
    ("model.onnx", "onnx/model.onnx"),
    ("tokenizer.json", "tokenizer.json"),
    ("config.json", "config.json"),
    ("special_tokens_map.json", "special_tokens_map.json"),
    ("tokenizer_config.json", "tokenizer_config.json"),
];

#[must_use]
pub fn default_model_dir() -> PathBuf {
    PathBuf::from("models").join(MODEL_NAME)
}

/// Whether every required model file exists in `model_dir`.
#[must_use]
pub fn all_files_present(model_dir: &Path) -> bool {
    missing_files(model_dir).is_empty()
}

fn missing_files(model_dir: &Path) -> Vec<(&'static str, &'static str)> {
    MODEL_FILES
        .iter()
        .filter(|(name, _)| !model_dir.join(name).is_file())
        .copied()
        .collect()
}

/// Download whichever model files are missing from `model_dir`.
pub fn download_model_files(model_dir: &Path) -> Result<()> {
    let missing = missing_files(model_dir);
    if missing.is_empty() {
        info!("All model files found in {}", model_dir.display());
        return Ok(());
    }

    fs::create_dir_all(model_dir)
        .with_context(|| format!("failed to create model directory {}", model_dir.display()))?;
    info!(
        "Downloading {} model files into {} (one-time, about 450MB)",
        missing.len(),
        model_dir.display()
    );

    for (filename, url_path) in missing {
        let url = format!("{HF_BASE}/{url_path}");
        info!("Downloading {filename}");
        download_file(&model_dir.join(filename), &url)
            .with_context(|| format!("failed to download {filename}"))?;
    }

    info!("Model download complete");
    Ok(())
}

fn download_file(dest: &Path, url: &str) -> Result<()> {
    let mut resp =
        reqwest::blocking::get(url).with_context(|| format!("HTTP request failed: {url}"))?;
    if !resp.status().is_success() {
        anyhow::bail!("bad status {} for {url}", resp.status());
    }

    let pb = match resp.content_length() {
        Some(total) if total > 0 => {
            let pb = ProgressBar::new(total);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("  {bar:40.cyan/blue} {percent}% ({bytes}/{total_bytes})")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("█▓░"),
            );
            pb
        }
        _ => ProgressBar::new_spinner(),
    };

    let tmp = dest.with_extension("part");
    let file =
        fs::File::create(&tmp).with_context(|| format!("failed to create {}", tmp.display()))?;
    let copied = resp.copy_to(&mut pb.wrap_write(file));
    pb.finish_and_clear();
    copied.with_context(|| format!("failed to write {}", tmp.display()))?;

    fs::rename(&tmp, dest).with_context(|| format!("failed to move {}", dest.display()))?;
    Ok(())
}
