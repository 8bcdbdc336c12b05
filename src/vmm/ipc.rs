use log::{debug, warn};
use std::fs;
use std::path::Path;


/// Per-core throughput multipliers used to scale a round budget into a local quantum.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IpcTable {
    weights: Vec<u64>,
}


impl IpcTable {
    pub fn uniform(core_count: usize) -> Self {
        Self { weights: vec![1; core_count] }
    }

    /// Load one weight per line from `path`.
    ///
    /// A missing or unreadable file is not an error: every core gets weight 1. Cores beyond
    /// the end of the file also get weight 1.
    pub fn load(core_count: usize, path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => Self::parse(core_count, &contents, path),
            Err(e) => {
                warn!(
                    "IPC file {} unavailable ({}); assuming IPC 1 for all {} cores",
                    path.display(),
                    e,
                    core_count
                );
                Self::uniform(core_count)
            }
        }
    }

    fn parse(core_count: usize, contents: &str, path: &Path) -> Self {
        let mut weights = Vec::with_capacity(core_count);
        for (lineno, line) in contents.lines().enumerate() {
            if weights.len() == core_count {
                warn!(
                    "IPC file {} has more than {} lines; ignoring the rest",
                    path.display(),
                    core_count
                );
                break;
            }
            let weight = parse_weight(line).unwrap_or_else(|| {
                warn!("IPC file {}:{}: {:?} is not a number, using 0", path.display(), lineno + 1, line);
                0
            });
            weights.push(weight);
        }

        if weights.len() < core_count {
            warn!(
                "IPC file {} lists {} of {} cores; the rest get IPC 1",
                path.display(),
                weights.len(),
                core_count
            );
            weights.resize(core_count, 1);
        }

        debug!("loaded IPC table from {}: {:?}", path.display(), weights);
        Self { weights }
    }

    pub fn len(&self) -> usize { self.weights.len() }
    pub fn is_empty(&self) -> bool { self.weights.is_empty() }

    /// Weight for `core`, 1 when the table has no entry for it.
    pub fn weight(&self, core: usize) -> u64 {
        self.weights.get(core).copied().unwrap_or(1)
    }

    pub fn weights(&self) -> &[u64] { &self.weights }
}


impl From<Vec<u64>> for IpcTable {
    fn from(weights: Vec<u64>) -> Self { Self { weights } }
}


// Leading whitespace is skipped and the leading run of decimal digits is taken, so "3 # big"
// reads as 3. Overflow saturates.
fn parse_weight(line: &str) -> Option<u64> {
    let s = line.trim_start();
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let digits = &s[..end];
    if digits.is_empty() {
        return None;
    }
    Some(digits.parse().unwrap_or(u64::MAX))
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn table_file(contents: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn missing_file_is_uniform() {
        let dir = tempfile::tempdir().unwrap();
        let t = IpcTable::load(4, &dir.path().join("ipc.txt"));
        assert_eq!(t.weights(), &[1, 1, 1, 1]);
    }

    #[test]
    fn weights_are_positional() {
        let f = table_file("1\n2\n");
        let t = IpcTable::load(2, f.path());
        assert_eq!(t.weights(), &[1, 2]);
    }

    #[test]
    fn short_file_pads_with_one() {
        let f = table_file("4\n");
        let t = IpcTable::load(3, f.path());
        assert_eq!(t.weights(), &[4, 1, 1]);
    }

    #[test]
    fn extra_lines_are_ignored() {
        let f = table_file("2\n3\n5\n7\n");
        let t = IpcTable::load(2, f.path());
        assert_eq!(t.weights(), &[2, 3]);
    }

    #[test]
    fn lenient_number_parsing() {
        let f = table_file("  8\n3 fast core\nslow\n0\n");
        let t = IpcTable::load(4, f.path());
        assert_eq!(t.weights(), &[8, 3, 0, 0]);
    }

    #[test]
    fn out_of_range_core_defaults_to_one() {
        let t = IpcTable::from(vec![5]);
        assert_eq!(t.weight(0), 5);
        assert_eq!(t.weight(9), 1);
    }
}
