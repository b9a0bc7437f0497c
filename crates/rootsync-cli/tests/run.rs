use async_trait::async_trait;
use clap::Parser;
use rootsync::{
    AnnotationService, LeafId, LeafLayer, LookupErrorKind, NmCoord, RecordParser, Resolution,
    RootId, ServiceError,
};
use rootsync_cli::{
    config::{CoordsArgs, CoordsConfig, ValidateArgs, ValidateConfig},
    output::RESULTS_MARKER,
    run,
};
use std::{collections::HashMap, fs, path::Path, sync::Arc, time::Instant};

/// Root `r` has leaf `r + 1`. Roots listed in `moved` now resolve elsewhere,
/// roots in `missing` do not exist.
struct Snapshot {
    moved: HashMap<u64, u64>,
    missing: Vec<u64>,
}

#[async_trait]
impl AnnotationService for Snapshot {
    async fn lookup_one(
        &self,
        id: RootId,
        _layer: LeafLayer,
    ) -> Result<Option<LeafId>, LookupErrorKind> {
        if self.missing.contains(&id.to_raw()) {
            return Err(LookupErrorKind::NotFound);
        }
        Ok(Some(LeafId::new(id.to_raw() + 1)))
    }

    async fn bulk_resolve(&self, keys: &[LeafId]) -> Result<HashMap<LeafId, RootId>, ServiceError> {
        Ok(keys
            .iter()
            .map(|k| {
                let root = k.to_raw() - 1;
                (*k, RootId::new(*self.moved.get(&root).unwrap_or(&root)))
            })
            .collect())
    }

    async fn bulk_coordinate_fetch(
        &self,
        keys: &[LeafId],
    ) -> Result<HashMap<LeafId, NmCoord>, ServiceError> {
        Ok(keys
            .iter()
            .map(|k| (*k, NmCoord::new(400.0, 800.0, 4000.0)))
            .collect())
    }

    async fn resolution_vector(&self) -> Result<Resolution, ServiceError> {
        Ok(Resolution::new(4.0, 4.0, 40.0).unwrap())
    }
}

fn snapshot() -> Arc<Snapshot> {
    Arc::new(Snapshot {
        moved: HashMap::from([(200, 250)]),
        missing: vec![300],
    })
}

fn write_input(dir: &Path, name: &str, contents: &str) -> String {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path.display().to_string()
}

#[tokio::test]
async fn validate_writes_report_and_clean_list() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), "ids.txt", "1 → 100\n2 → 200\nbad-line\n3 → 300\n");
    let config = ValidateConfig::try_from(
        ValidateArgs::try_parse_from(["validate-ids", "-i", &input, "-w", "2"]).unwrap(),
    )
    .unwrap();
    let parsed = run::read_input(&config.run.input, RecordParser::identity()).unwrap();

    let summary = run::validate_with(snapshot(), &config, parsed, Instant::now())
        .await
        .unwrap();

    assert_eq!(summary.counts.current, 1);
    assert_eq!(summary.counts.updated, 1);
    assert_eq!(summary.counts.lookup_failed, 1);
    assert_eq!(summary.skipped_lines, 1);
    assert_eq!(summary.report, dir.path().join("ids_updated.txt"));

    let report = fs::read_to_string(&summary.report).unwrap();
    let (header, rows) = report.split_once(RESULTS_MARKER).unwrap();
    assert!(header.starts_with("# ID Validation Report"));
    assert!(header.contains("# Skipped lines: 1"));
    let rows: Vec<_> = rows.trim().lines().collect();
    assert_eq!(rows[0], "100 CURRENT");
    assert_eq!(rows[1], "250 UPDATED(from 200)");
    assert!(rows[2].starts_with("300 LOOKUP_FAILED"));
    assert_eq!(rows.len(), 3);

    let clean = fs::read_to_string(dir.path().join("ids_updated_clean.txt")).unwrap();
    assert_eq!(clean, "100\n250\n");
}

#[tokio::test]
async fn fetch_coords_writes_tsv() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), "cells.txt", "# traced today\n100\n300\n");
    let config = CoordsConfig::try_from(
        CoordsArgs::try_parse_from(["fetch-coords", "--input", &input]).unwrap(),
    )
    .unwrap();
    let parsed = run::read_input(&config.run.input, RecordParser::coordinates()).unwrap();

    let summary = run::fetch_coords_with(snapshot(), &config, parsed, Instant::now())
        .await
        .unwrap();

    assert_eq!(summary.skipped_lines, 0);
    assert_eq!(
        fs::read_to_string(dir.path().join("cells_coords.tsv")).unwrap(),
        "root_id\tx\ty\tz\n100\t100\t200\t100\n300\tERROR\tERROR\tERROR\n"
    );
}

#[test]
fn input_without_ids_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), "empty.txt", "\n# only a comment\nnot-an-id\n");

    let err = run::read_input(Path::new(&input), RecordParser::coordinates()).unwrap_err();
    assert!(err.to_string().starts_with("No IDs found"));
}
