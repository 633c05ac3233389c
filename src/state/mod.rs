//! Run fingerprint: the settings snapshot persisted between invocations.
//!
//! On startup the previous fingerprint is loaded and compared against one
//! built from the live configuration. Any difference in a
//! categorization-affecting setting forces a full rebuild instead of an
//! incremental run, because persisted units may have been grouped or named
//! under rules that no longer hold.

use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::Path;

use anyhow::Context;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use tracing::{debug, info};

use crate::config::Config;
use crate::recheck::{SCANNER_REVISION, SCANNER_VERSION};

const ROOT_ELEMENT: &str = "run-state";

/// Flat key/value snapshot of the settings that shape categorization.
///
/// Keys are grouped by prefix (`library.`, `scanner.`, `tool.`) and kept
/// sorted so the serialized form is stable across runs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunFingerprint {
    entries: BTreeMap<String, String>,
}

impl RunFingerprint {
    pub fn from_config(config: &Config) -> Self {
        let mut entries = BTreeMap::new();
        let mut put = |key: &str, value: String| {
            entries.insert(key.to_string(), value);
        };

        let mut roots: Vec<String> = config
            .libraries
            .iter()
            .map(|lib| lib.path.to_string_lossy().into_owned())
            .collect();
        roots.sort();
        put("library.roots", roots.join("|"));

        let s = &config.scanner;
        put("scanner.extensions", s.extensions.join("|"));
        put("scanner.hash_path_depth", s.hash_path_depth.to_string());
        put("scanner.nmj_compliant", s.nmj_compliant.to_string());
        put("scanner.play_full_bluray", s.play_full_bluray.to_string());
        put(
            "scanner.exclude_multipart_bluray",
            s.exclude_multipart_bluray.to_string(),
        );
        put(
            "scanner.use_rar_last_modified",
            s.use_rar_last_modified.to_string(),
        );

        put(
            "nfo.directory",
            config
                .nfo
                .directory
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default(),
        );
        put("nfo.accept_all", config.nfo.accept_all.to_string());

        put("tool.version", SCANNER_VERSION.to_string());
        put("tool.revision", SCANNER_REVISION.to_string());

        Self { entries }
    }

    /// Keys whose values differ from `previous`, including keys present on
    /// only one side.
    pub fn changed_keys(&self, previous: &RunFingerprint) -> Vec<String> {
        let mut changed: Vec<String> = self
            .entries
            .iter()
            .filter(|(key, value)| previous.entries.get(*key) != Some(value))
            .map(|(key, _)| key.clone())
            .collect();
        for key in previous.entries.keys() {
            if !self.entries.contains_key(key) {
                changed.push(key.clone());
            }
        }
        changed.sort();
        changed.dedup();
        changed
    }

    /// True when a settings difference invalidates the persisted library.
    pub fn forces_rebuild(&self, previous: &RunFingerprint) -> bool {
        let changed = self.changed_keys(previous);
        if changed.is_empty() {
            return false;
        }
        info!(changed = ?changed, "settings changed since last run, full rebuild required");
        true
    }

    pub fn load(path: &Path) -> anyhow::Result<Option<RunFingerprint>> {
        if !path.exists() {
            debug!(path = %path.display(), "no previous run state");
            return Ok(None);
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read run state from {}", path.display()))?;
        let fingerprint = Self::parse(&text)
            .with_context(|| format!("failed to parse run state from {}", path.display()))?;
        Ok(Some(fingerprint))
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let xml = self.to_xml()?;
        std::fs::write(path, xml)
            .with_context(|| format!("failed to write run state to {}", path.display()))?;
        debug!(path = %path.display(), "run state saved");
        Ok(())
    }

    fn to_xml(&self) -> anyhow::Result<String> {
        let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        writer.write_event(Event::Start(BytesStart::new(ROOT_ELEMENT)))?;
        for (key, value) in &self.entries {
            let mut start = BytesStart::new("entry");
            start.push_attribute(("key", key.as_str()));
            writer.write_event(Event::Start(start))?;
            writer.write_event(Event::Text(BytesText::new(value)))?;
            writer.write_event(Event::End(BytesEnd::new("entry")))?;
        }
        writer.write_event(Event::End(BytesEnd::new(ROOT_ELEMENT)))?;
        String::from_utf8(writer.into_inner().into_inner()).context("run state is not UTF-8")
    }

    fn parse(text: &str) -> anyhow::Result<RunFingerprint> {
        let mut reader = Reader::from_str(text);
        reader.config_mut().trim_text(true);
        let mut entries = BTreeMap::new();
        let mut current_key: Option<String> = None;
        loop {
            match reader.read_event()? {
                Event::Start(start) if start.name().as_ref() == b"entry" => {
                    let key = start
                        .try_get_attribute("key")?
                        .context("entry element without key attribute")?
                        .unescape_value()?
                        .into_owned();
                    // empty values have no text event, record them up front
                    entries.insert(key.clone(), String::new());
                    current_key = Some(key);
                }
                Event::Text(text) => {
                    if let Some(key) = &current_key {
                        entries.insert(key.clone(), text.unescape()?.into_owned());
                    }
                }
                Event::End(end) if end.name().as_ref() == b"entry" => current_key = None,
                Event::Eof => break,
                _ => {}
            }
        }
        Ok(RunFingerprint { entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fingerprint() -> RunFingerprint {
        let mut config = Config::default();
        config.libraries.push(crate::config::LibraryRoot {
            path: "/media/movies".into(),
            excludes: vec![],
        });
        RunFingerprint::from_config(&config)
    }

    #[test]
    fn identical_settings_do_not_force_rebuild() {
        let a = fingerprint();
        let b = a.clone();
        assert!(!a.forces_rebuild(&b));
    }

    #[test]
    fn changed_grouping_setting_forces_rebuild() {
        let mut config = Config::default();
        config.libraries.push(crate::config::LibraryRoot {
            path: "/media/movies".into(),
            excludes: vec![],
        });
        config.scanner.hash_path_depth = 3;
        let current = RunFingerprint::from_config(&config);
        let previous = fingerprint();
        assert!(current.forces_rebuild(&previous));
        assert_eq!(
            current.changed_keys(&previous),
            vec!["scanner.hash_path_depth".to_string()]
        );
    }

    #[test]
    fn round_trips_through_xml() {
        let original = fingerprint();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run-state.xml");
        original.save(&path).unwrap();
        let loaded = RunFingerprint::load(&path).unwrap().unwrap();
        assert_eq!(original, loaded);
    }

    #[test]
    fn missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(RunFingerprint::load(&dir.path().join("absent.xml"))
            .unwrap()
            .is_none());
    }
}
