use anyhow::Context;
use chrono::NaiveDate;
use dsdcore::telegram::RawSample;
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Directory of staged telegrams, one JSON-lines file per site and day.
pub struct TelegramSource {
    dir: PathBuf,
}

impl TelegramSource {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, site: &str, date: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("{}_{}.jsonl", site, date.format("%Y%m%d")))
    }

    /// Loads the telegrams for one site/day, sorted by timestamp.
    ///
    /// Returns `Ok(None)` when nothing has been staged for that day.
    pub fn load(&self, site: &str, date: NaiveDate) -> anyhow::Result<Option<Vec<RawSample>>> {
        let path = self.path_for(site, date);
        if !path.is_file() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("reading telegrams {}", path.display()))?;

        let mut samples = Vec::new();
        for (line_no, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let sample: RawSample = serde_json::from_str(line).with_context(|| {
                format!("parsing telegram at {}:{}", path.display(), line_no + 1)
            })?;
            samples.push(sample);
        }
        samples.sort_by_key(|s| s.timestamp);
        Ok(Some(samples))
    }

    /// Writes a new telegram file for one site/day. An existing file is never
    /// replaced.
    pub fn store(&self, site: &str, date: NaiveDate, samples: &[RawSample]) -> anyhow::Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating telegram directory {}", self.dir.display()))?;
        let path = self.path_for(site, date);
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .with_context(|| format!("creating telegram file {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        for sample in samples {
            serde_json::to_writer(&mut writer, sample)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::profile::{build_telegrams, GeneratorConfig};
    use dsdcore::CalibrationTable;

    #[test]
    fn store_then_load_returns_sorted_samples() {
        let dir = tempfile::tempdir().unwrap();
        let source = TelegramSource::new(dir.path());
        let date = NaiveDate::from_ymd_opt(2015, 11, 12).unwrap();
        let config = GeneratorConfig::for_day(date, 3, 7);
        let mut telegrams = build_telegrams(&config, &CalibrationTable::parsivel()).unwrap();
        telegrams.reverse();

        let path = source.store("apu04", date, &telegrams).unwrap();
        assert!(path.ends_with("apu04_20151112.jsonl"));

        let loaded = source.load("apu04", date).unwrap().unwrap();
        assert_eq!(loaded.len(), telegrams.len());
        assert!(loaded.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[test]
    fn store_keeps_existing_telegrams() {
        let dir = tempfile::tempdir().unwrap();
        let source = TelegramSource::new(dir.path());
        let date = NaiveDate::from_ymd_opt(2015, 11, 12).unwrap();
        let calib = CalibrationTable::parsivel();
        let real = build_telegrams(&GeneratorConfig::for_day(date, 2, 1), &calib).unwrap();
        source.store("apu04", date, &real).unwrap();

        let other = build_telegrams(&GeneratorConfig::for_day(date, 5, 2), &calib).unwrap();
        assert!(source.store("apu04", date, &other).is_err());
        let loaded = source.load("apu04", date).unwrap().unwrap();
        assert_eq!(loaded.len(), real.len());
        assert_eq!(loaded.last().map(|s| s.timestamp), real.last().map(|s| s.timestamp));
    }

    #[test]
    fn missing_day_is_unavailable_and_corrupt_line_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = TelegramSource::new(dir.path());
        let date = NaiveDate::from_ymd_opt(2015, 11, 12).unwrap();
        assert!(source.load("apu04", date).unwrap().is_none());

        fs::write(source.path_for("apu04", date), "{\"timestamp\": 3}\n").unwrap();
        let err = source.load("apu04", date).unwrap_err();
        assert!(format!("{err:#}").contains(":1"));
    }
}
