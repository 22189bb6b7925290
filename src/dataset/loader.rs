//! Dataset Loader
//!
//! Enumerates labeled samples from the fixed train/validate/test layout.
//! Samples are only paths plus labels; decoding happens at batch time.

use std::path::{Path, PathBuf};

use burn::data::dataset::Dataset;
use colored::Colorize;
use serde::Serialize;
use tracing::{debug, info};
use walkdir::WalkDir;

use super::codec::ImageCodec;
use super::{Label, Split};
use crate::utils::error::{JaundiceError, Result};

/// A single labeled image on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub path: PathBuf,
    pub label: Label,
}

/// All samples of one split, in deterministic (sorted) order
#[derive(Debug, Clone)]
pub struct SplitSamples {
    pub split: Split,
    pub samples: Vec<Sample>,
}

impl SplitSamples {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Sample count per label, indexed by `Label::index`
    pub fn label_counts(&self) -> [usize; 2] {
        let mut counts = [0usize; 2];
        for sample in &self.samples {
            counts[sample.label.index()] += 1;
        }
        counts
    }

    /// Labels in enumeration order
    pub fn labels(&self) -> Vec<Label> {
        self.samples.iter().map(|s| s.label).collect()
    }

    /// Fail with `EmptyDataset` if the split has no samples
    pub fn ensure_not_empty(&self) -> Result<()> {
        if self.is_empty() {
            return Err(JaundiceError::EmptyDataset {
                split: self.split.to_string(),
            });
        }
        Ok(())
    }
}

impl Dataset<Sample> for SplitSamples {
    fn get(&self, index: usize) -> Option<Sample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// The three splits of a dataset root
#[derive(Debug, Clone)]
pub struct DatasetSplits {
    pub root: PathBuf,
    pub train: SplitSamples,
    pub validate: SplitSamples,
    pub test: SplitSamples,
}

impl DatasetSplits {
    /// Enumerate every split under `root`
    ///
    /// Fails with `DatasetLayout` if a split directory or either of its label
    /// directories is missing.
    pub fn load<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(JaundiceError::DatasetLayout {
                path: root,
                reason: "dataset root does not exist".to_string(),
            });
        }

        info!("Loading dataset splits from {:?}", root);

        let train = load_split(&root, Split::Train)?;
        let validate = load_split(&root, Split::Validate)?;
        let test = load_split(&root, Split::Test)?;

        info!(
            "Found {} train, {} validate, {} test samples",
            train.len(),
            validate.len(),
            test.len()
        );

        Ok(Self {
            root,
            train,
            validate,
            test,
        })
    }

    pub fn split(&self, split: Split) -> &SplitSamples {
        match split {
            Split::Train => &self.train,
            Split::Validate => &self.validate,
            Split::Test => &self.test,
        }
    }

    pub fn stats(&self) -> DatasetStats {
        DatasetStats::from_splits(self)
    }
}

/// Accepted directory names for a label within a split, in lookup order
pub fn label_dir_candidates(split: Split, label: Label) -> [String; 3] {
    [
        format!("{} {}", split.dir_name(), label.short_code()),
        label.name().to_string(),
        label.short_code().to_string(),
    ]
}

/// Find the directory holding `label` samples for `split`
fn resolve_label_dir(split_dir: &Path, split: Split, label: Label) -> Result<PathBuf> {
    let candidates = label_dir_candidates(split, label);

    candidates
        .iter()
        .map(|name| split_dir.join(name))
        .find(|path| path.is_dir())
        .ok_or_else(|| JaundiceError::DatasetLayout {
            path: split_dir.to_path_buf(),
            reason: format!(
                "missing {} directory (expected one of: {})",
                label,
                candidates.join(", ")
            ),
        })
}

fn load_split(root: &Path, split: Split) -> Result<SplitSamples> {
    let split_dir = root.join(split.dir_name());
    if !split_dir.is_dir() {
        return Err(JaundiceError::DatasetLayout {
            path: split_dir,
            reason: format!("missing '{}' split directory", split),
        });
    }

    let mut samples = Vec::new();
    for label in Label::ALL {
        let label_dir = resolve_label_dir(&split_dir, split, label)?;
        let images = list_images(&label_dir);
        debug!("{}/{}: {} images in {:?}", split, label, images.len(), label_dir);

        samples.extend(images.into_iter().map(|path| Sample { path, label }));
    }

    Ok(SplitSamples { split, samples })
}

/// Image files directly inside `dir`, sorted by path
fn list_images(dir: &Path) -> Vec<PathBuf> {
    let mut images: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|path| {
            let supported = ImageCodec::is_supported_path(path);
            if !supported {
                debug!("Skipping unsupported file {:?}", path);
            }
            supported
        })
        .collect();

    images.sort();
    images
}

/// Per-split label counts
#[derive(Debug, Clone, Serialize)]
pub struct SplitStats {
    pub split: Split,
    pub normal: usize,
    pub jaundice: usize,
}

impl SplitStats {
    pub fn total(&self) -> usize {
        self.normal + self.jaundice
    }
}

/// Dataset statistics across all splits
#[derive(Debug, Clone, Serialize)]
pub struct DatasetStats {
    pub splits: Vec<SplitStats>,
}

impl DatasetStats {
    pub fn from_splits(splits: &DatasetSplits) -> Self {
        let splits = Split::ALL
            .iter()
            .map(|&split| {
                let [normal, jaundice] = splits.split(split).label_counts();
                SplitStats {
                    split,
                    normal,
                    jaundice,
                }
            })
            .collect();

        Self { splits }
    }

    pub fn total_normal(&self) -> usize {
        self.splits.iter().map(|s| s.normal).sum()
    }

    pub fn total_jaundice(&self) -> usize {
        self.splits.iter().map(|s| s.jaundice).sum()
    }

    pub fn total(&self) -> usize {
        self.total_normal() + self.total_jaundice()
    }

    /// Share of (normal, jaundice) samples in percent
    pub fn balance(&self) -> (f64, f64) {
        let total = self.total().max(1) as f64;
        (
            100.0 * self.total_normal() as f64 / total,
            100.0 * self.total_jaundice() as f64 / total,
        )
    }

    /// Print the statistics to stdout
    pub fn print(&self) {
        println!();
        println!("{}", "Dataset Statistics".cyan().bold());
        for split in &self.splits {
            println!("  {}:", split.split.to_string().to_uppercase().bold());
            println!("    Normal:   {}", split.normal);
            println!("    Jaundice: {}", split.jaundice);
            println!("    Total:    {}", split.total());
        }

        let (normal_pct, jaundice_pct) = self.balance();
        println!("  {}:", "TOTAL".bold());
        println!("    Normal:   {}", self.total_normal());
        println!("    Jaundice: {}", self.total_jaundice());
        println!("    Total:    {}", self.total());
        println!(
            "    Balance:  Normal {:.1}% / Jaundice {:.1}%",
            normal_pct, jaundice_pct
        );
        println!();
    }
}
