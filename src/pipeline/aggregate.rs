//! Aggregation: per-page record lists → one ordered collection.
//!
//! Plain concatenation in page order. Records are not deduplicated, and a
//! row that the source report broke across two pages stays as two partial
//! records.

use crate::output::Record;

/// Concatenate page results, page order first, emission order second.
///
/// A failed or empty page is an empty list and contributes nothing.
pub fn aggregate<I>(results_per_page: I) -> Vec<Record>
where
    I: IntoIterator<Item = Vec<Record>>,
{
    results_per_page.into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(tag: &str) -> Record {
        Record {
            destino: Some(tag.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn preserves_page_and_row_order() {
        let pages = vec![
            vec![rec("p1r1"), rec("p1r2")],
            vec![],
            vec![rec("p3r1")],
        ];
        let all = aggregate(pages);
        let tags: Vec<_> = all.iter().filter_map(|r| r.destino.as_deref()).collect();
        assert_eq!(tags, vec!["p1r1", "p1r2", "p3r1"]);
    }

    #[test]
    fn length_is_sum_of_page_lengths() {
        let pages: Vec<Vec<Record>> = (0..5)
            .map(|n| (0..n).map(|i| rec(&format!("{n}-{i}"))).collect())
            .collect();
        let expected: usize = pages.iter().map(Vec::len).sum();
        assert_eq!(aggregate(pages).len(), expected);
    }

    #[test]
    fn duplicates_are_kept() {
        let all = aggregate(vec![vec![rec("x")], vec![rec("x")]]);
        assert_eq!(all.len(), 2);
    }
}
