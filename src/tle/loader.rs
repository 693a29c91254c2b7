use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::tle::types::{MalformedTle, PipelineInput, SatelliteRecord};
use crate::tle::TleError;

pub struct TleLoader {
    constellation: String,
    source: PathBuf,
    satellites: BTreeMap<u32, SatelliteRecord>,
    malformed: Vec<MalformedTle>,
}

impl TleLoader {
    pub fn new(constellation: &str, source: PathBuf) -> Self {
        Self {
            constellation: constellation.to_string(),
            source,
            satellites: BTreeMap::new(),
            malformed: Vec::new(),
        }
    }

    /// Load every element set of the constellation. `source` may be a single
    /// file or a directory of `.tle` / `.txt` files.
    pub fn load_all(&mut self) -> Result<(), TleError> {
        if !self.source.exists() {
            return Err(TleError::SourceNotFound(self.source.display().to_string()));
        }

        self.satellites.clear();
        self.malformed.clear();

        if self.source.is_file() {
            let path = self.source.clone();
            self.parse_tle_file(&path)?;
            return Ok(());
        }

        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.source)? {
            let path = entry?.path();
            if path.is_file() {
                if let Some(ext) = path.extension() {
                    if ext == "tle" || ext == "txt" {
                        paths.push(path);
                    }
                }
            }
        }
        paths.sort();

        for path in paths {
            if let Err(e) = self.parse_tle_file(&path) {
                log::warn!(
                    "[{}] failed to read TLE file {}: {}",
                    self.constellation,
                    path.display(),
                    e
                );
                self.malformed.push(MalformedTle {
                    constellation: self.constellation.clone(),
                    source: file_name(&path),
                    line_number: 0,
                    catalog_number: None,
                    message: format!("unreadable file: {}", e),
                });
            }
        }

        Ok(())
    }

    /// Parse a single TLE file (may contain multiple satellites). Entries that
    /// fail to parse are recorded and skipped.
    fn parse_tle_file(&mut self, path: &Path) -> Result<(), TleError> {
        let content = fs::read_to_string(path)?;
        let filename = file_name(path);
        let parsed = parse_multi_tle(&content);

        for entry in parsed.entries {
            let TleEntry {
                line_number,
                name,
                line1,
                line2,
            } = entry;
            match SatelliteRecord::from_tle(&self.constellation, name, &line1, &line2) {
                Ok(record) => self.insert(record),
                Err(e) => self.reject(&filename, line_number, &line1, e.to_string()),
            }
        }
        for (line_number, line) in parsed.orphans {
            self.reject(
                &filename,
                line_number,
                &line,
                "element line without its companion line".to_string(),
            );
        }

        Ok(())
    }

    fn reject(&mut self, source: &str, line_number: usize, line: &str, message: String) {
        log::warn!(
            "[{}] malformed TLE in {} at line {}: {}",
            self.constellation,
            source,
            line_number,
            message
        );
        self.malformed.push(MalformedTle {
            constellation: self.constellation.clone(),
            source: source.to_string(),
            line_number,
            catalog_number: catalog_number(line),
            message,
        });
    }

    /// Keeps the newest epoch when a catalog number appears twice.
    fn insert(&mut self, record: SatelliteRecord) {
        match self.satellites.get(&record.norad_id) {
            Some(existing) if existing.elements.epoch >= record.elements.epoch => {
                log::debug!(
                    "[{}] dropping older duplicate of {}",
                    self.constellation,
                    record.norad_id
                );
            }
            _ => {
                self.satellites.insert(record.norad_id, record);
            }
        }
    }

    /// Loaded records ordered by catalog number.
    pub fn satellites(&self) -> Vec<&SatelliteRecord> {
        self.satellites.values().collect()
    }

    pub fn into_parts(self, limit: Option<usize>) -> (Vec<SatelliteRecord>, Vec<MalformedTle>) {
        let limit = limit.unwrap_or(usize::MAX);
        let records = self.satellites.into_values().take(limit).collect();
        (records, self.malformed)
    }
}

impl PipelineInput {
    pub fn load(config: &Config) -> Result<Self, TleError> {
        let mut input = PipelineInput::default();

        for (name, constellation) in &config.constellations {
            let mut loader = TleLoader::new(name, constellation.tle_path.clone());
            loader.load_all()?;
            let (records, malformed) = loader.into_parts(constellation.sample_limit);
            log::info!(
                "[{}] loaded {} element sets ({} malformed) from {}",
                name,
                records.len(),
                malformed.len(),
                constellation.tle_path.display()
            );
            input.constellations.insert(name.clone(), records);
            input.malformed.extend(malformed);
        }

        Ok(input)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string()
}

/// Columns 3-7 of either element line.
fn catalog_number(line: &str) -> Option<u32> {
    line.get(2..7)?.trim().parse().ok()
}

/// One complete element set found in TLE text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TleEntry {
    /// First line of the entry (the name line for 3-line entries).
    pub line_number: usize,
    pub name: Option<String>,
    pub line1: String,
    pub line2: String,
}

#[derive(Debug, Default)]
pub struct ParsedTle {
    pub entries: Vec<TleEntry>,
    /// Element lines that are not part of a complete entry.
    pub orphans: Vec<(usize, String)>,
}

/// Split multi-satellite TLE text into 2-line and 3-line entries.
pub fn parse_multi_tle(content: &str) -> ParsedTle {
    let lines: Vec<(usize, &str)> = content
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim()))
        .filter(|(_, l)| !l.is_empty())
        .collect();
    let is_line1 = |i: usize| lines.get(i).is_some_and(|(_, l)| l.starts_with("1 "));
    let is_line2 = |i: usize| lines.get(i).is_some_and(|(_, l)| l.starts_with("2 "));

    let mut parsed = ParsedTle::default();
    let mut i = 0;

    while i < lines.len() {
        let (line_number, line) = lines[i];
        if is_line1(i) && is_line2(i + 1) {
            parsed.entries.push(TleEntry {
                line_number,
                name: None,
                line1: line.to_string(),
                line2: lines[i + 1].1.to_string(),
            });
            i += 2;
        } else if !is_line1(i) && !is_line2(i) && is_line1(i + 1) && is_line2(i + 2) {
            parsed.entries.push(TleEntry {
                line_number,
                name: Some(line.trim_start_matches("0 ").to_string()),
                line1: lines[i + 1].1.to_string(),
                line2: lines[i + 2].1.to_string(),
            });
            i += 3;
        } else {
            if is_line1(i) || is_line2(i) {
                parsed.orphans.push((line_number, line.to_string()));
            } else {
                log::debug!("skipping unrecognised TLE line {}", line_number);
            }
            i += 1;
        }
    }

    parsed
}
