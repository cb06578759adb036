//! Scenario data loading.
//!
//! Reads a domain's input files from its scenario folder without blocking
//! the runtime. Parsing happens here so that a malformed file fails the load
//! instead of reaching the domain.

use std::path::{Path, PathBuf};

use crisis_cascade::{DomainProfile, FloodSchedule};
use crisis_geo::{Grid, GridHeader};
use crisis_types::{DomainKind, FeatureCollection};
use tracing::{debug, info};

use crate::domain::ScenarioData;
use crate::error::CoreError;

/// Base grid of the coverage domain.
pub const COVERAGE_GRID_FILE: &str = "coveragesim.asc";

/// Load the input files of `kind` from `folder`.
///
/// # Errors
///
/// Returns [`CoreError::MissingData`] when a required file is absent,
/// [`CoreError::Io`] on read failures, and parse errors for malformed
/// content.
pub async fn load_scenario_data(kind: DomainKind, folder: &Path) -> Result<ScenarioData, CoreError> {
    if let Some(profile) = DomainProfile::for_kind(kind) {
        let path = folder.join(profile.file_name);
        let text = read(&path).await?;
        let collection: FeatureCollection =
            serde_json::from_str(&text).map_err(|source| CoreError::Payload {
                subject: path.display().to_string(),
                source,
            })?;
        info!(domain = %kind, features = collection.features.len(), "Loaded feature collection");
        return Ok(ScenarioData::Features(collection.features));
    }
    match kind {
        DomainKind::CellCoverage => {
            let text = read(&folder.join(COVERAGE_GRID_FILE)).await?;
            let (header, _) = GridHeader::parse_esri(&text)?;
            Ok(ScenarioData::CoverageGrid(header))
        }
        _ => load_flood_keyframes(folder).await,
    }
}

async fn load_flood_keyframes(folder: &Path) -> Result<ScenarioData, CoreError> {
    let mut entries = tokio::fs::read_dir(folder).await.map_err(|source| io(folder, source))?;
    let mut files: Vec<(i64, PathBuf)> = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|source| io(folder, source))? {
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            continue;
        };
        match FloodSchedule::keyframe_minutes(&name)? {
            Some(minutes) => files.push((minutes, entry.path())),
            None => debug!(file = %name, "Skipping non-keyframe file"),
        }
    }
    if files.is_empty() {
        return Err(CoreError::MissingData {
            path: folder.join("<minutes>.asc"),
        });
    }
    files.sort_by_key(|(minutes, _)| *minutes);

    let mut keyframes = Vec::with_capacity(files.len());
    for (minutes, path) in files {
        let text = read(&path).await?;
        keyframes.push((minutes, Grid::parse_esri(&text)?));
    }
    info!(keyframes = keyframes.len(), folder = %folder.display(), "Loaded flood keyframes");
    Ok(ScenarioData::Flood(keyframes))
}

async fn read(path: &Path) -> Result<String, CoreError> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Ok(text),
        Err(source) if source.kind() == std::io::ErrorKind::NotFound => Err(CoreError::MissingData {
            path: path.to_path_buf(),
        }),
        Err(source) => Err(io(path, source)),
    }
}

fn io(path: &Path, source: std::io::Error) -> CoreError {
    CoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const GRID: &str = "ncols 2\nnrows 2\nxllcorner 4.0\nyllcorner 52.0\ncellsize 0.5\nNODATA_value -9999\n0 1\n2 3\n";

    fn temp_folder(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("crisis-loader-{tag}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn loads_entity_features() {
        let dir = temp_folder("roads");
        std::fs::write(
            dir.join("road_objects.json"),
            r#"{"type":"FeatureCollection","features":[
                {"type":"Feature","geometry":{"type":"Point","coordinates":[4.1,52.1]},"properties":{"Name":"A4"}}
            ]}"#,
        )
        .unwrap();

        let data = load_scenario_data(DomainKind::Roads, &dir).await.unwrap();
        assert!(matches!(data, ScenarioData::Features(ref f) if f.len() == 1));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn missing_entity_file_is_reported() {
        let dir = temp_folder("empty");
        let err = load_scenario_data(DomainKind::ElectricalNetwork, &dir)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::MissingData { ref path } if path.ends_with("power_stations.json")));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn flood_keyframes_sorted_and_base_map_skipped() {
        let dir = temp_folder("flood");
        for name in ["120.asc", "-1.asc", "30.asc"] {
            std::fs::write(dir.join(name), GRID).unwrap();
        }
        std::fs::write(dir.join("readme.txt"), "").unwrap();

        let data = load_scenario_data(DomainKind::Flooding, &dir).await.unwrap();
        let minutes: Vec<i64> = match &data {
            ScenarioData::Flood(frames) => frames.iter().map(|(m, _)| *m).collect(),
            _ => Vec::new(),
        };
        assert_eq!(minutes, vec![30, 120]);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn coverage_reads_grid_header() {
        let dir = temp_folder("coverage");
        std::fs::write(dir.join(COVERAGE_GRID_FILE), GRID).unwrap();
        let data = load_scenario_data(DomainKind::CellCoverage, &dir).await.unwrap();
        assert!(matches!(data, ScenarioData::CoverageGrid(_)));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
