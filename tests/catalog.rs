mod common;

use std::collections::HashSet;
use std::path::PathBuf;

use common::{TestWorkspace, strings};
use csv_stack::{
    catalog::{ColumnCatalog, FileColumns},
    order,
    sniffer::Dialect,
};
use encoding_rs::UTF_8;
use proptest::prelude::*;

fn comma_dialect() -> Dialect {
    Dialect {
        delimiter: b',',
        has_header: true,
        skip_rows: 0,
    }
}

#[test]
fn identical_files_are_all_equal() {
    let workspace = TestWorkspace::new();
    let paths = workspace.write_clean();
    let catalog = ColumnCatalog::build(&paths, &comma_dialect(), UTF_8, 5, &[]).expect("catalog");

    assert!(catalog.is_all_equal());
    let expected = strings(&["date", "sales", "cost", "profit"]);
    assert_eq!(catalog.columns_all(), expected.as_slice());
    assert_eq!(catalog.columns_common(), expected.as_slice());
    assert!(catalog.columns_unique().is_empty());
}

#[test]
fn extra_column_is_unique_to_one_file() {
    let workspace = TestWorkspace::new();
    let paths = workspace.write_colmismatch();
    let catalog = ColumnCatalog::build(&paths, &comma_dialect(), UTF_8, 5, &[]).expect("catalog");

    assert!(!catalog.is_all_equal());
    assert_eq!(
        catalog.columns_common(),
        strings(&["date", "sales", "cost", "profit"]).as_slice()
    );
    assert_eq!(catalog.columns_unique(), strings(&["profit2"]).as_slice());
    assert_eq!(catalog.files_with_column("profit2"), vec![paths[2].as_path()]);

    let (headers, rows) = catalog.presence_table(catalog.columns_unique());
    assert_eq!(headers, strings(&["filename", "profit2"]));
    assert_eq!(rows[0], strings(&["sales-colmismatch-jan.csv", "false"]));
    assert_eq!(rows[2], strings(&["sales-colmismatch-mar.csv", "true"]));
}

#[test]
fn single_file_catalog_is_its_own_header() {
    let workspace = TestWorkspace::new();
    let path = workspace.write("only.csv", "b,a,c\n1,2,3\n");
    let catalog =
        ColumnCatalog::build(&[path], &comma_dialect(), UTF_8, 5, &[]).expect("catalog");
    let expected = strings(&["b", "a", "c"]);
    assert_eq!(catalog.columns_all(), expected.as_slice());
    assert_eq!(catalog.columns_common(), expected.as_slice());
}

#[test]
fn reserved_tag_columns_are_not_catalogued() {
    let workspace = TestWorkspace::new();
    let path = workspace.write("tagged.csv", "date,filename,sales\n2011-01-01,old.csv,1\n");
    let catalog = ColumnCatalog::build(
        &[path],
        &comma_dialect(),
        UTF_8,
        5,
        &["filepath", "filename"],
    )
    .expect("catalog");
    assert_eq!(catalog.columns_all(), strings(&["date", "sales"]).as_slice());
}

#[test]
fn rebuilding_from_unchanged_files_is_identical() {
    let workspace = TestWorkspace::new();
    let paths = workspace.write_colmismatch();
    let first = ColumnCatalog::build(&paths, &comma_dialect(), UTF_8, 5, &[]).expect("first");
    let second = ColumnCatalog::build(&paths, &comma_dialect(), UTF_8, 5, &[]).expect("second");
    assert_eq!(first, second);
}

#[test]
fn missing_file_is_named_in_the_error() {
    let workspace = TestWorkspace::new();
    let missing = workspace.path().join("absent.csv");
    let err = ColumnCatalog::build(&[missing], &comma_dialect(), UTF_8, 5, &[]).unwrap_err();
    assert!(format!("{err:#}").contains("absent.csv"));
}

#[test]
fn displaced_column_follows_its_usual_position() {
    let files = vec![
        FileColumns {
            path: PathBuf::from("a.csv"),
            columns: strings(&["id", "name", "amount"]),
        },
        FileColumns {
            path: PathBuf::from("b.csv"),
            columns: strings(&["id", "name", "amount"]),
        },
        FileColumns {
            path: PathBuf::from("c.csv"),
            columns: strings(&["amount", "id", "name"]),
        },
    ];
    let catalog = ColumnCatalog::from_file_columns(files);
    assert_eq!(
        catalog.columns_all(),
        strings(&["id", "name", "amount"]).as_slice()
    );
    let amount = catalog
        .ranks()
        .iter()
        .find(|rank| rank.name == "amount")
        .expect("amount rank");
    assert_eq!((amount.mode_position, amount.mode_count), (2, 2));
}

fn file_columns_strategy() -> impl Strategy<Value = Vec<Vec<String>>> {
    let pool = vec!["date", "sales", "cost", "profit", "profit2", "region", "sku"];
    proptest::collection::vec(
        proptest::sample::subsequence(pool.clone(), 1..=pool.len()).prop_shuffle(),
        1..6,
    )
    .prop_map(|files| {
        files
            .into_iter()
            .map(|columns| columns.into_iter().map(String::from).collect())
            .collect()
    })
}

fn catalog_for(files: &[Vec<String>]) -> ColumnCatalog {
    ColumnCatalog::from_file_columns(
        files
            .iter()
            .enumerate()
            .map(|(idx, columns)| FileColumns {
                path: PathBuf::from(format!("file-{idx}.csv")),
                columns: columns.clone(),
            })
            .collect(),
    )
}

proptest! {
    #[test]
    fn catalog_sets_match_per_file_columns(files in file_columns_strategy()) {
        let catalog = catalog_for(&files);
        let all = catalog.columns_all().iter().cloned().collect::<HashSet<_>>();
        for columns in &files {
            for column in columns {
                prop_assert!(all.contains(column));
            }
        }
        prop_assert_eq!(all.len(), catalog.columns_all().len());

        let mut common = files[0].iter().cloned().collect::<HashSet<_>>();
        for columns in &files[1..] {
            let set = columns.iter().cloned().collect::<HashSet<_>>();
            common = common.intersection(&set).cloned().collect();
        }
        let catalogued = catalog.columns_common().iter().cloned().collect::<HashSet<_>>();
        prop_assert_eq!(catalogued, common);
        prop_assert_eq!(
            catalog.columns_common().len() + catalog.columns_unique().len(),
            catalog.columns_all().len()
        );
    }

    #[test]
    fn canonical_order_is_reproducible(files in file_columns_strategy()) {
        let first = catalog_for(&files);
        let second = catalog_for(&files);
        prop_assert_eq!(first.columns_all(), second.columns_all());

        let columns = first.columns_all().to_vec();
        let positions = files
            .iter()
            .map(|file| {
                columns
                    .iter()
                    .map(|column| file.iter().position(|c| c == column))
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();
        let reranked = order::rank_columns(&columns, &positions)
            .into_iter()
            .map(|rank| rank.name)
            .collect::<Vec<_>>();
        prop_assert_eq!(reranked, columns);
    }
}
