use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use tracing::{debug, info, trace, warn};

use crate::datetime::{self, ExamPeriod};

const RC_ENV_VAR: &str = "ROKIRC";
const RC_FILE: &str = ".rokirc";

/// Key=value configuration with `include` support, loaded from the rc
/// file and optionally overridden per invocation with `rc.key=value`.
#[derive(Debug, Clone)]
pub struct Config {
    map: HashMap<String, String>,
    pub loaded_files: Vec<PathBuf>,
}

impl Config {
    #[tracing::instrument(skip(rc_override))]
    pub fn load(rc_override: Option<&Path>) -> anyhow::Result<Self> {
        let mut cfg = Config {
            map: HashMap::new(),
            loaded_files: vec![],
        };

        cfg.map
            .insert("data.location".to_string(), "~/.roki".to_string());
        cfg.map
            .insert("default.command".to_string(), "list".to_string());
        cfg.map.insert("color".to_string(), "on".to_string());

        if let Some(path) = resolve_rc_path(rc_override)? {
            info!(rokirc = %path.display(), "loading rc file");
            cfg.load_file(&path)?;
        } else {
            debug!("no rc file found; using defaults");
        }

        Ok(cfg)
    }

    #[tracing::instrument(skip(self, overrides))]
    pub fn apply_overrides<I>(&mut self, overrides: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in overrides {
            let key = key.strip_prefix("rc.").unwrap_or(&key).to_string();
            debug!(key = %key, value = %value, "applying override");
            self.map.insert(key, value);
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.map.get(key).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.map.iter()
    }

    /// Exam periods from `period.<name>=<start>..<end>` keys, ordered by
    /// range start.
    pub fn periods(&self) -> anyhow::Result<Vec<ExamPeriod>> {
        let mut out = Vec::new();
        for (key, value) in &self.map {
            if let Some(name) = key.strip_prefix("period.") {
                let (start, end) = datetime::parse_date_range(value)
                    .with_context(|| format!("invalid period {key}"))?;
                out.push(ExamPeriod {
                    name: name.to_string(),
                    start,
                    end,
                });
            }
        }
        out.sort_by_key(|period| period.start);
        if out.is_empty() {
            warn!("no exam periods configured; every exam will fall outside them");
        }
        Ok(out)
    }

    /// Instructor display-name overrides from the file named by
    /// `names.file`: a header line, then `raw;display` lines.
    pub fn name_overrides(&self) -> anyhow::Result<HashMap<String, String>> {
        let Some(raw_path) = self.get("names.file") else {
            return Ok(HashMap::new());
        };

        let path = expand_tilde(Path::new(&raw_path));
        let text = fs::read_to_string(&path)
            .with_context(|| format!("failed to read names file {}", path.display()))?;

        let mut out = HashMap::new();
        for (line_num, line) in text.lines().enumerate().skip(1) {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (raw, display) = line.split_once(';').ok_or_else(|| {
                anyhow!(
                    "invalid names line {}:{}: expected raw;display",
                    path.display(),
                    line_num + 1
                )
            })?;
            out.insert(raw.trim().to_string(), display.trim().to_string());
        }

        debug!(count = out.len(), "loaded instructor name overrides");
        Ok(out)
    }

    pub fn summary_pattern(&self) -> Option<String> {
        self.get("import.summary")
    }

    pub fn date_format(&self) -> Option<String> {
        self.get("import.dateformat")
    }

    #[tracing::instrument(skip(self))]
    fn load_file(&mut self, path: &Path) -> anyhow::Result<()> {
        let path = expand_tilde(path);
        let text = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;

        self.loaded_files.push(path.clone());
        let base_dir = path
            .parent()
            .map(|parent| parent.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        for (line_num, raw_line) in text.lines().enumerate() {
            let mut line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((before, _)) = line.split_once('#') {
                line = before.trim();
            }
            if line.is_empty() {
                continue;
            }

            if let Some(include_rest) = line.strip_prefix("include ") {
                let include_path = resolve_include_path(&base_dir, include_rest.trim())?;
                if include_path.exists() {
                    self.load_file(&include_path)?;
                } else {
                    warn!(include = %include_path.display(), "include file does not exist; skipping");
                }
                continue;
            }

            let (key, value) = line.split_once('=').ok_or_else(|| {
                anyhow!(
                    "invalid config line {}:{}: {}",
                    path.display(),
                    line_num + 1,
                    raw_line
                )
            })?;

            let key = key.trim().to_string();
            let value = value.trim().to_string();
            trace!(key = %key, value = %value, "loaded config key");
            self.map.insert(key, value);
        }

        Ok(())
    }
}

#[tracing::instrument(skip(cfg, override_dir))]
pub fn resolve_data_dir(cfg: &Config, override_dir: Option<&Path>) -> anyhow::Result<PathBuf> {
    let dir = if let Some(path) = override_dir {
        path.to_path_buf()
    } else if let Some(value) = cfg.get("data.location") {
        expand_tilde(Path::new(&value))
    } else {
        default_data_dir()?
    };

    if !dir.exists() {
        info!(dir = %dir.display(), "creating data directory");
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }

    Ok(dir)
}

fn resolve_rc_path(override_path: Option<&Path>) -> anyhow::Result<Option<PathBuf>> {
    if let Some(path) = override_path {
        return Ok(Some(path.to_path_buf()));
    }

    if let Ok(env_value) = std::env::var(RC_ENV_VAR) {
        if env_value == "/dev/null" {
            return Ok(None);
        }
        return Ok(Some(PathBuf::from(env_value)));
    }

    let home = dirs::home_dir().ok_or_else(|| anyhow!("cannot determine home directory"))?;
    let candidate = home.join(RC_FILE);
    if candidate.exists() {
        return Ok(Some(candidate));
    }

    Ok(None)
}

fn default_data_dir() -> anyhow::Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| anyhow!("cannot determine home directory"))?;
    Ok(home.join(".roki"))
}

fn resolve_include_path(base_dir: &Path, include: &str) -> anyhow::Result<PathBuf> {
    if include.trim().is_empty() {
        return Err(anyhow!("include path cannot be empty"));
    }

    let expanded = expand_tilde(&PathBuf::from(include));
    if expanded.is_absolute() {
        Ok(expanded)
    } else {
        Ok(base_dir.join(expanded))
    }
}

fn expand_tilde(path: &Path) -> PathBuf {
    let text = path.to_string_lossy();
    if let Some(rest) = text.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::Config;

    fn config_from(text: &str) -> Config {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(text.as_bytes()).expect("write rc");
        let mut cfg = Config::load(Some(file.path())).expect("load");
        cfg.apply_overrides(std::iter::empty());
        cfg
    }

    #[test]
    fn periods_parse_and_sort_by_start() {
        let cfg = config_from(
            "period.letno=2022-06-15..2022-07-15\n\
             period.zimsko=2022-01-15..2022-02-15\n",
        );
        let periods = cfg.periods().expect("periods");
        assert_eq!(periods.len(), 2);
        assert_eq!(periods[0].name, "zimsko");
        assert_eq!(periods[1].name, "letno");
    }

    #[test]
    fn overrides_replace_rc_values() {
        let mut cfg = config_from("color=off\n");
        assert_eq!(cfg.get("color").as_deref(), Some("off"));
        cfg.apply_overrides(vec![("rc.color".to_string(), "on".to_string())]);
        assert_eq!(cfg.get("color").as_deref(), Some("on"));
        // built-in defaults survive an rc file that does not mention them
        assert_eq!(cfg.get("default.command").as_deref(), Some("list"));
    }

    #[test]
    fn malformed_period_ranges_are_reported() {
        let cfg = config_from("period.zimsko=2022-01-15\n");
        assert!(cfg.periods().is_err());
    }
}
