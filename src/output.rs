// Letter output: one pretty JSON file per letter, or JSON Lines on a stream.
// Each record is fully serialized before anything touches the destination, and
// directory output goes through a temp file + rename so a crash never leaves a
// half-written letter behind.

use crate::error::Result;
use crate::model::Letter;
use log::debug;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Digest of one written letter, keyed by its serialized form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestEntry {
    pub id: i64,
    pub file: Option<String>,
    pub blake3: String,
}

/// `0042.json` style name used for per-letter files.
pub fn letter_file_name(id: i64) -> String {
    format!("{id:04}.json")
}

fn digest(serialized: &str) -> String {
    hex::encode(blake3::hash(serialized.as_bytes()).as_bytes())
}

/// Write every letter to `dir/NNNN.json`, creating `dir` if needed.
pub fn write_letter_dir(
    dir: &Path,
    letters: &[Letter],
    bar: Option<&indicatif::ProgressBar>,
) -> Result<Vec<ManifestEntry>> {
    fs::create_dir_all(dir)?;
    let mut manifest = Vec::with_capacity(letters.len());
    for letter in letters {
        let mut serialized = serde_json::to_string_pretty(letter)?;
        serialized.push('\n');
        let name = letter_file_name(letter.id);

        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(serialized.as_bytes())?;
        tmp.persist(dir.join(&name)).map_err(|e| e.error)?;

        debug!(
            "write_letter_dir: {} ({})",
            name,
            letter.first("Title").unwrap_or("untitled")
        );
        manifest.push(ManifestEntry {
            id: letter.id,
            file: Some(name),
            blake3: digest(&serialized),
        });
        if let Some(b) = bar {
            b.inc(1);
        }
    }
    if let Some(b) = bar {
        b.finish();
    }
    Ok(manifest)
}

/// Write letters as JSON Lines, one compact record per line.
pub fn write_json_lines<W: Write>(out: &mut W, letters: &[Letter]) -> Result<Vec<ManifestEntry>> {
    let mut manifest = Vec::with_capacity(letters.len());
    for letter in letters {
        let mut line = serde_json::to_string(letter)?;
        line.push('\n');
        out.write_all(line.as_bytes())?;
        manifest.push(ManifestEntry {
            id: letter.id,
            file: None,
            blake3: digest(&line),
        });
    }
    out.flush()?;
    Ok(manifest)
}

pub fn write_manifest(path: &Path, entries: &[ManifestEntry]) -> Result<()> {
    let json = serde_json::to_string_pretty(entries)?;
    fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn letter(id: i64, title: &str) -> Letter {
        let mut metadata = IndexMap::new();
        metadata.insert("Title".to_string(), vec![Some(title.to_string())]);
        Letter {
            id,
            added: None,
            modified: None,
            public: true,
            metadata,
            tags: vec![],
            files: vec![],
        }
    }

    #[test]
    fn file_names_are_zero_padded() {
        assert_eq!(letter_file_name(7), "0007.json");
        assert_eq!(letter_file_name(194), "0194.json");
        assert_eq!(letter_file_name(12345), "12345.json");
    }

    #[test]
    fn writes_one_file_per_letter_without_temp_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let letters = vec![letter(1, "Kjære Marie"), letter(2, "Dear John")];
        let manifest = write_letter_dir(dir.path(), &letters, None).unwrap();

        let mut names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        names.sort();
        assert_eq!(names, vec!["0001.json", "0002.json"]);

        let text = fs::read_to_string(dir.path().join("0001.json")).unwrap();
        // UTF-8 stays unescaped.
        assert!(text.contains("Kjære Marie"));
        let back: Letter = serde_json::from_str(&text).unwrap();
        assert_eq!(back, letters[0]);
        assert_eq!(manifest[0].blake3, digest(&text));
    }

    #[test]
    fn json_lines_and_digests_are_stable() {
        let letters = vec![letter(5, "a"), letter(6, "b")];
        let mut first = Vec::new();
        let mut second = Vec::new();
        let m1 = write_json_lines(&mut first, &letters).unwrap();
        let m2 = write_json_lines(&mut second, &letters).unwrap();
        assert_eq!(first, second);
        assert_eq!(m1, m2);
        let text = String::from_utf8(first).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert_eq!(m1[0].blake3.len(), 64);
        assert_ne!(m1[0].blake3, m1[1].blake3);
    }

    #[test]
    fn manifest_is_written_as_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        let entries = vec![ManifestEntry {
            id: 3,
            file: Some("0003.json".into()),
            blake3: "00".into(),
        }];
        write_manifest(&path, &entries).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value[0]["file"], "0003.json");
    }
}
