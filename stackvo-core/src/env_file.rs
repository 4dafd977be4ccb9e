//! The `.env` configuration store.
//!
//! Keys follow `<NAMESPACE>_<UNITNAME>_<FIELD>` (`SERVICE_REDIS_ENABLE=true`,
//! `TOOLS_ADMINER_URL=adminer`). Writes overwrite an existing line or append a
//! missing one and land atomically (`.tmp` sibling → `rename`), so a `read()`
//! issued after `write()` returns always observes the new value.
//!
//! Clones of one [`EnvFile`] share a write lock; every read-modify-write on
//! the document runs under it.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{io_err, CoreError};
use crate::types::{UnitKind, UnitName};

/// Suffixes that describe a unit rather than carry one of its credentials.
const RESERVED_FIELDS: [&str; 3] = ["ENABLE", "VERSION", "URL"];

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Handle on the `.env` file at a fixed path.
#[derive(Debug, Clone)]
pub struct EnvFile {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl EnvFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse the whole document.
    pub fn read(&self) -> Result<EnvDocument, CoreError> {
        let contents = fs::read_to_string(&self.path).map_err(|e| io_err(&self.path, e))?;
        Ok(EnvDocument::parse(&contents))
    }

    /// Set `key=value`, replacing every existing `key=` line or appending one.
    ///
    /// Write flow: rewrite → `.tmp` sibling → `fsync` → `rename`.
    pub fn write(&self, key: &str, value: &str) -> Result<(), CoreError> {
        // A poisoned lock only means another writer panicked mid-write; the
        // file itself is still whole thanks to the rename.
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let contents = fs::read_to_string(&self.path).map_err(|e| io_err(&self.path, e))?;
        let updated = set_line(&contents, key, value);

        let tmp_path = self.tmp_path();
        {
            let mut file = File::create(&tmp_path).map_err(|e| io_err(&tmp_path, e))?;
            file.write_all(updated.as_bytes())
                .map_err(|e| io_err(&tmp_path, e))?;
            file.sync_all().map_err(|e| io_err(&tmp_path, e))?;
        }
        if let Ok(meta) = fs::metadata(&self.path) {
            let _ = fs::set_permissions(&tmp_path, meta.permissions());
        }
        if let Err(err) = fs::rename(&tmp_path, &self.path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(io_err(&self.path, err));
        }
        Ok(())
    }

    /// Persist the enable flag for a flag-driven unit.
    ///
    /// Returns the key that was written.
    pub fn set_enabled(
        &self,
        kind: UnitKind,
        name: &UnitName,
        enabled: bool,
    ) -> Result<String, CoreError> {
        let key = enable_key(kind, name).ok_or_else(|| {
            io_err(
                &self.path,
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("{kind} units have no enable flag"),
                ),
            )
        })?;
        self.write(&key, if enabled { "true" } else { "false" })?;
        Ok(key)
    }

    fn tmp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| ".env".to_string());
        let n = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        self.path
            .with_file_name(format!("{name}.{}.{n}.tmp", std::process::id()))
    }
}

/// `<NS>_<SEGMENT>_ENABLE` for flag-driven kinds; `None` for projects.
pub fn enable_key(kind: UnitKind, name: &UnitName) -> Option<String> {
    unit_key(kind, name, "ENABLE")
}

/// `<NS>_<SEGMENT>_<FIELD>` for flag-driven kinds.
pub fn unit_key(kind: UnitKind, name: &UnitName, field: &str) -> Option<String> {
    kind.env_namespace()
        .map(|ns| format!("{ns}_{}_{field}", name.env_segment()))
}

fn set_line(contents: &str, key: &str, value: &str) -> String {
    let prefix = format!("{key}=");
    let mut found = false;
    let mut lines: Vec<String> = contents
        .lines()
        .map(|line| {
            if line.starts_with(&prefix) {
                found = true;
                format!("{key}={value}")
            } else {
                line.to_string()
            }
        })
        .collect();

    if !found {
        lines.push(format!("{key}={value}"));
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

// ---------------------------------------------------------------------------
// Parsed document
// ---------------------------------------------------------------------------

/// An ordered, parsed view of the `.env` file.
///
/// Blank lines and `#` comments are skipped; values keep everything after the
/// first `=`. Later duplicates win on lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvDocument {
    entries: Vec<(String, String)>,
}

impl EnvDocument {
    pub fn parse(contents: &str) -> Self {
        let entries = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| {
                let (key, value) = line.split_once('=')?;
                let key = key.trim();
                if key.is_empty() {
                    return None;
                }
                Some((key.to_string(), value.trim().to_string()))
            })
            .collect();
        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Every `<NS>_<NAME>_ENABLE=true|false` entry for `kind`, in file order.
    ///
    /// Values other than `true`/`false` are ignored, as is a repeated name.
    pub fn enable_flags(&self, kind: UnitKind) -> Vec<(UnitName, bool)> {
        let Some(ns) = kind.env_namespace() else {
            return Vec::new();
        };
        let prefix = format!("{ns}_");
        let mut seen = Vec::<UnitName>::new();
        let mut flags = Vec::new();
        for (key, _) in &self.entries {
            let Some(segment) = key
                .strip_prefix(&prefix)
                .and_then(|rest| rest.strip_suffix("_ENABLE"))
            else {
                continue;
            };
            if segment.is_empty() {
                continue;
            }
            let name = UnitName::from_env_segment(segment);
            if seen.contains(&name) {
                continue;
            }
            let enabled = match self.get(key) {
                Some("true") => true,
                Some("false") => false,
                _ => continue,
            };
            seen.push(name.clone());
            flags.push((name, enabled));
        }
        flags
    }

    /// Whether the unit's enable flag currently reads `true`.
    pub fn is_enabled(&self, kind: UnitKind, name: &UnitName) -> bool {
        enable_key(kind, name)
            .and_then(|key| self.get(&key).map(|v| v == "true"))
            .unwrap_or(false)
    }

    /// `<NS>_<NAME>_<FIELD>` for the unit.
    pub fn unit_value(&self, kind: UnitKind, name: &UnitName, field: &str) -> Option<&str> {
        unit_key(kind, name, field).and_then(|key| self.get(&key))
    }

    /// All non-reserved `<NS>_<NAME>_<KEY>` entries for `name`.
    ///
    /// `known` lists every unit of the kind; an entry is attributed to the
    /// longest matching unit segment so `SERVICE_MY_SQL_USER` goes to `my-sql`
    /// rather than `my`.
    pub fn unit_credentials(
        &self,
        kind: UnitKind,
        name: &UnitName,
        known: &[UnitName],
    ) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        let Some(ns) = kind.env_namespace() else {
            return out;
        };
        let ns_prefix = format!("{ns}_");
        let own = format!("{}_", name.env_segment());

        for (key, value) in &self.entries {
            let Some(rest) = key.strip_prefix(&ns_prefix) else {
                continue;
            };
            let Some(field) = rest.strip_prefix(&own) else {
                continue;
            };
            if field.is_empty() || RESERVED_FIELDS.contains(&field) {
                continue;
            }
            let claimed_by_longer = known.iter().any(|other| {
                let seg = other.env_segment();
                seg.len() > name.env_segment().len() && rest.starts_with(&format!("{seg}_"))
            });
            if claimed_by_longer {
                continue;
            }
            out.insert(field.to_string(), value.clone());
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = "\
# stack
SERVICE_REDIS_ENABLE=false
SERVICE_REDIS_VERSION=7.2
SERVICE_MY_ENABLE=true
SERVICE_MY_SQL_ENABLE=true
SERVICE_MY_SQL_ROOT_PASSWORD=root
SERVICE_MY_TOKEN=abc
TOOLS_ADMINER_ENABLE=true
TOOLS_ADMINER_URL=adminer
SERVICE_BROKEN_ENABLE=maybe
";

    fn write_env(dir: &TempDir, contents: &str) -> EnvFile {
        let path = dir.path().join(".env");
        fs::write(&path, contents).expect("write .env");
        EnvFile::new(path)
    }

    #[test]
    fn enable_flags_are_namespaced_and_ordered() {
        let doc = EnvDocument::parse(SAMPLE);
        let services = doc.enable_flags(UnitKind::Service);
        let names: Vec<_> = services.iter().map(|(n, e)| (n.0.as_str(), *e)).collect();
        assert_eq!(names, [("redis", false), ("my", true), ("my-sql", true)]);

        let tools = doc.enable_flags(UnitKind::Tool);
        assert_eq!(tools, vec![(UnitName::from("adminer"), true)]);
        assert!(doc.enable_flags(UnitKind::Project).is_empty());
    }

    #[test]
    fn credentials_go_to_longest_matching_unit() {
        let doc = EnvDocument::parse(SAMPLE);
        let known = vec![UnitName::from("my"), UnitName::from("my-sql")];

        let my = doc.unit_credentials(UnitKind::Service, &UnitName::from("my"), &known);
        assert_eq!(my.len(), 1);
        assert_eq!(my.get("TOKEN").map(String::as_str), Some("abc"));

        let my_sql = doc.unit_credentials(UnitKind::Service, &UnitName::from("my-sql"), &known);
        assert_eq!(my_sql.get("ROOT_PASSWORD").map(String::as_str), Some("root"));
        assert!(!my_sql.contains_key("ENABLE"));
    }

    #[test]
    fn write_overwrites_existing_key_in_place() {
        let dir = TempDir::new().unwrap();
        let env = write_env(&dir, SAMPLE);
        env.write("SERVICE_REDIS_ENABLE", "true").expect("write");

        let raw = fs::read_to_string(env.path()).unwrap();
        assert_eq!(raw.matches("SERVICE_REDIS_ENABLE=").count(), 1);
        assert!(raw.starts_with("# stack\nSERVICE_REDIS_ENABLE=true\n"));
        assert!(env.read().unwrap().is_enabled(UnitKind::Service, &UnitName::from("redis")));
    }

    #[test]
    fn write_appends_missing_key() {
        let dir = TempDir::new().unwrap();
        let env = write_env(&dir, "A=1");
        env.write("SERVICE_KAFKA_ENABLE", "true").expect("write");
        let raw = fs::read_to_string(env.path()).unwrap();
        assert_eq!(raw, "A=1\nSERVICE_KAFKA_ENABLE=true\n");
    }

    #[test]
    fn write_leaves_no_tmp_behind() {
        let dir = TempDir::new().unwrap();
        let env = write_env(&dir, SAMPLE);
        env.set_enabled(UnitKind::Tool, &UnitName::from("adminer"), false)
            .expect("set");
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty(), "tmp files left: {leftovers:?}");
    }

    #[test]
    fn concurrent_writers_through_clones_keep_every_key() {
        let dir = TempDir::new().unwrap();
        let env = write_env(&dir, "# stack\n");

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let env = env.clone();
                std::thread::spawn(move || {
                    for round in 0..10 {
                        env.write(&format!("SERVICE_S{i}_ENABLE"), &format!("{}", round % 2 == 1))?;
                    }
                    Ok::<_, CoreError>(())
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("writer thread").expect("write");
        }

        let doc = env.read().unwrap();
        for i in 0..8 {
            assert_eq!(doc.get(&format!("SERVICE_S{i}_ENABLE")), Some("true"), "S{i}");
        }
    }

    #[test]
    fn set_enabled_rejects_projects() {
        let dir = TempDir::new().unwrap();
        let env = write_env(&dir, SAMPLE);
        let err = env
            .set_enabled(UnitKind::Project, &UnitName::from("blog"), true)
            .unwrap_err();
        assert!(matches!(err, CoreError::Io { .. }));
    }

    #[test]
    fn read_missing_file_is_io_error_with_path() {
        let dir = TempDir::new().unwrap();
        let env = EnvFile::new(dir.path().join(".env"));
        let err = env.read().unwrap_err();
        assert!(err.to_string().contains(".env"));
    }

    #[test]
    fn values_keep_embedded_equals() {
        let doc = EnvDocument::parse("SERVICE_X_DSN=a=b=c\n");
        assert_eq!(doc.get("SERVICE_X_DSN"), Some("a=b=c"));
    }
}
