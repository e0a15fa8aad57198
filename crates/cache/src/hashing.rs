use sha2::{Digest, Sha256};
use sqlbox_core::{Cell, ExecutionInput, ExecutionOutput};

const INPUT_DOMAIN: &str = "sqlbox/input/v1";
const OUTPUT_DOMAIN: &str = "sqlbox/output/v1";

const NULL_TAG: u8 = 0;
const PRESENT_TAG: u8 = 1;

/// Content hasher over a length-prefixed structured encoding
///
/// Every string and sequence is prefixed with its length as a little-endian
/// `u64`, and every nullable cell with a presence tag, so no two distinct
/// values share an encoding.
#[derive(Debug, Clone)]
pub struct ContentHasher {
    hasher: Sha256,
}

impl ContentHasher {
    /// Start a digest separated from other kinds of values by `domain`
    pub fn new(domain: &str) -> Self {
        let mut hasher = Self {
            hasher: Sha256::new(),
        };
        hasher.write_str(domain);
        hasher
    }

    pub fn write_len(&mut self, len: usize) {
        self.hasher.update((len as u64).to_le_bytes());
    }

    pub fn write_str(&mut self, value: &str) {
        self.write_len(value.len());
        self.hasher.update(value.as_bytes());
    }

    pub fn write_cell(&mut self, cell: &Cell) {
        match cell {
            None => self.hasher.update([NULL_TAG]),
            Some(value) => {
                self.hasher.update([PRESENT_TAG]);
                self.write_str(value);
            }
        }
    }

    /// Lowercase hex digest, 64 characters
    pub fn finalize(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

/// Hash of an input whose query has already been normalized
pub fn hash_input(input: &ExecutionInput) -> String {
    let mut hasher = ContentHasher::new(INPUT_DOMAIN);
    hasher.write_str(&input.init);
    hasher.write_str(&input.query);
    hasher.finalize()
}

/// Hash of an output; equal iff header, rows and null positions are equal
pub fn hash_output(output: &ExecutionOutput) -> String {
    let mut hasher = ContentHasher::new(OUTPUT_DOMAIN);

    hasher.write_len(output.header.len());
    for column in &output.header {
        hasher.write_str(column);
    }

    hasher.write_len(output.rows.len());
    for row in &output.rows {
        hasher.write_len(row.len());
        for cell in row {
            hasher.write_cell(cell);
        }
    }

    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn output(header: &[&str], rows: &[&[Option<&str>]]) -> ExecutionOutput {
        ExecutionOutput::new(
            header.iter().map(|h| (*h).to_string()).collect(),
            rows.iter()
                .map(|row| row.iter().map(|c| c.map(String::from)).collect())
                .collect(),
        )
    }

    #[test]
    fn test_hash_is_hex_sha256() {
        let hash = hash_input(&ExecutionInput::new("CREATE TABLE t (id INTEGER);", "SELECT 1"));
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_input_field_boundaries_matter() {
        assert_ne!(
            hash_input(&ExecutionInput::new("ab", "c")),
            hash_input(&ExecutionInput::new("a", "bc"))
        );
        assert_ne!(
            hash_input(&ExecutionInput::new("", "SELECT 1")),
            hash_input(&ExecutionInput::new("SELECT 1", ""))
        );
    }

    #[test]
    fn test_null_differs_from_empty_string() {
        assert_ne!(
            hash_output(&output(&["name"], &[&[None]])),
            hash_output(&output(&["name"], &[&[Some("")]]))
        );
    }

    #[test]
    fn test_null_position_matters() {
        assert_ne!(
            hash_output(&output(&["a", "b"], &[&[None, Some("x")]])),
            hash_output(&output(&["a", "b"], &[&[Some("x"), None]]))
        );
    }

    #[test]
    fn test_row_and_cell_boundaries_matter() {
        assert_ne!(
            hash_output(&output(&["a"], &[&[Some("1")], &[Some("2")]])),
            hash_output(&output(&["a"], &[&[Some("1"), Some("2")]]))
        );
        assert_ne!(
            hash_output(&output(&["a"], &[&[Some("12")]])),
            hash_output(&output(&["a"], &[&[Some("1"), Some("2")]]))
        );
        assert_ne!(
            hash_output(&output(&["ab"], &[])),
            hash_output(&output(&["a", "b"], &[]))
        );
    }

    #[test]
    fn test_appending_a_row_changes_hash() {
        let base = output(&["id"], &[&[Some("1")]]);
        let mut longer = base.clone();
        longer.rows.push(vec![Some("2".to_string())]);
        assert_ne!(hash_output(&base), hash_output(&longer));
    }

    #[test]
    fn test_domains_are_separated() {
        // an output and an input with overlapping encodings still differ
        assert_ne!(
            hash_input(&ExecutionInput::new("", "")),
            hash_output(&ExecutionOutput::empty())
        );
    }

    fn arb_rows() -> impl Strategy<Value = Vec<Vec<Option<String>>>> {
        let row = prop::collection::vec(prop::option::of("[a-c]{0,2}"), 2);
        prop::collection::vec(row, 0..4)
    }

    proptest! {
        #[test]
        fn prop_input_hash_is_deterministic(init in ".*", query in ".*") {
            let input = ExecutionInput::new(init, query);
            prop_assert_eq!(hash_input(&input), hash_input(&input.clone()));
        }

        #[test]
        fn prop_query_change_changes_hash(init in ".*", query in ".*", extra in "[a-z]") {
            let a = ExecutionInput::new(init.clone(), query.clone());
            let b = ExecutionInput::new(init, format!("{query}{extra}"));
            prop_assert_ne!(hash_input(&a), hash_input(&b));
        }

        #[test]
        fn prop_output_hash_tracks_equality(
            rows_a in arb_rows(),
            rows_b in arb_rows(),
        ) {
            let header = vec!["l".to_string(), "r".to_string()];
            let a = ExecutionOutput::new(header.clone(), rows_a);
            let b = ExecutionOutput::new(header, rows_b);
            prop_assert_eq!(a == b, hash_output(&a) == hash_output(&b));
        }
    }
}
