//! Canonical column ordering.
//!
//! Each column is ranked by the position it most often occupies across the
//! files that contain it. Sorting by that modal position (ties broken by how
//! many files agree on it) keeps consistently placed columns where users expect
//! them, while rare or erratically placed columns drift to wherever they usually
//! appear. Columns with identical keys keep their first-encounter order.

use std::collections::BTreeMap;

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnRank {
    pub name: String,
    pub mode_position: usize,
    pub mode_count: usize,
}

/// Most frequent position and how many files share it; ties go to the smaller position.
pub fn modal_position<I>(positions: I) -> Option<(usize, usize)>
where
    I: IntoIterator<Item = usize>,
{
    let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
    for position in positions {
        *counts.entry(position).or_insert(0) += 1;
    }
    let mut best: Option<(usize, usize)> = None;
    for (position, count) in counts {
        if best.is_none_or(|(_, top)| count > top) {
            best = Some((position, count));
        }
    }
    best
}

/// Ranks `columns` using `positions[file][column]`, the column's index in
/// each file or `None` when the file lacks it.
///
/// A column absent from every file sorts last.
pub fn rank_columns(columns: &[String], positions: &[Vec<Option<usize>>]) -> Vec<ColumnRank> {
    let mut ranks = columns
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            let found = positions
                .iter()
                .filter_map(|file| file.get(idx).copied().flatten());
            let (mode_position, mode_count) = modal_position(found).unwrap_or((usize::MAX, 0));
            ColumnRank {
                name: name.clone(),
                mode_position,
                mode_count,
            }
        })
        .collect::<Vec<_>>();
    ranks.sort_by(|a, b| {
        a.mode_position
            .cmp(&b.mode_position)
            .then_with(|| b.mode_count.cmp(&a.mode_count))
    });
    ranks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(ranks: &[ColumnRank]) -> Vec<&str> {
        ranks.iter().map(|r| r.name.as_str()).collect()
    }

    #[test]
    fn modal_position_prefers_smallest_on_tie() {
        assert_eq!(modal_position([2, 1, 2, 1]), Some((1, 2)));
        assert_eq!(modal_position([3, 3, 0]), Some((3, 2)));
        assert_eq!(modal_position(Vec::new()), None);
    }

    #[test]
    fn trailing_extra_column_sorts_last() {
        let columns = ["profit2", "date", "sales", "cost", "profit"]
            .map(String::from)
            .to_vec();
        let positions = vec![
            vec![None, Some(0), Some(1), Some(2), Some(3)],
            vec![None, Some(0), Some(1), Some(2), Some(3)],
            vec![Some(4), Some(0), Some(1), Some(2), Some(3)],
        ];
        let ranks = rank_columns(&columns, &positions);
        assert_eq!(names(&ranks), vec!["date", "sales", "cost", "profit", "profit2"]);
        assert_eq!(ranks[4].mode_count, 1);
    }

    #[test]
    fn reordered_file_follows_majority() {
        let columns = ["a", "b", "c"].map(String::from).to_vec();
        let positions = vec![
            vec![Some(0), Some(1), Some(2)],
            vec![Some(0), Some(1), Some(2)],
            vec![Some(2), Some(0), Some(1)],
        ];
        assert_eq!(names(&rank_columns(&columns, &positions)), vec!["a", "b", "c"]);
    }

    #[test]
    fn equal_modes_rank_by_agreement() {
        let columns = ["rare", "common"].map(String::from).to_vec();
        let positions = vec![
            vec![Some(1), Some(1)],
            vec![None, Some(1)],
            vec![None, Some(1)],
        ];
        assert_eq!(names(&rank_columns(&columns, &positions)), vec!["common", "rare"]);
    }
}
