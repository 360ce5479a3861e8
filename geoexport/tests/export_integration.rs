//! Tests d'intégration : export réel via GDAL dans des fichiers temporaires
//!
//! Exécution:
//! ```bash
//! cargo test -p geoexport --test export_integration
//! ```

use std::path::Path;

use gdal::vector::LayerAccess;
use gdal::Dataset;
use serde_json::{json, Value};

use geoexport::report::ResultStream;
use geoexport::{Exporter, Schema};

fn job(output: &Path, overwrite: bool, target_crs: &str, datasets: Value) -> exportjob::ExportPayload {
    job_for("GPKG", output, overwrite, false, target_crs, datasets)
}

fn job_for(
    driver: &str,
    output: &Path,
    overwrite: bool,
    merge: bool,
    target_crs: &str,
    datasets: Value,
) -> exportjob::ExportPayload {
    let document = json!({
        "datasets": datasets,
        "driver": driver,
        "merge": merge,
        "output_dir": output.to_str().unwrap(),
        "overwrite": overwrite,
        "target_crs": target_crs,
    });
    exportjob::decode_str(&document.to_string()).unwrap()
}

fn parcels(hash: &str, layer: &str, source_crs: &str, features: Value) -> Value {
    let count = features.as_array().map_or(0, Vec::len);
    json!({
        "features": features,
        "hash": hash,
        "layer_name": layer,
        "source_crs": source_crs,
        "source_path": "/tmp/a.json",
        "total_features": count,
    })
}

fn export(payload: exportjob::ExportPayload) -> Vec<Value> {
    gdal::DriverManager::register_all();
    let schema = Schema::from_preset("default").unwrap();
    let mut exporter = Exporter::with_gdal(schema, "EPSG:4526").unwrap();

    let mut stream = ResultStream::new(Vec::new());
    exporter.run(payload, &mut stream).unwrap();

    String::from_utf8(stream.into_inner())
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

fn layer_count(path: &Path, layer: &str) -> u64 {
    let dataset = Dataset::open(path).unwrap();
    let layer = dataset.layer_by_name(layer).unwrap();
    layer.feature_count()
}

#[test]
fn test_scenario_single_polygon_gpkg() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.gpkg");

    let records = export(job(
        &output,
        true,
        "EPSG:4490",
        json!([parcels(
            "a1",
            "parcels",
            "EPSG:4490",
            json!([{"properties": {"pid": "001", "area": 120.5}, "wkt": "POLYGON((0 0,1 0,1 1,0 1,0 0))"}])
        )]),
    ));

    assert_eq!(records, vec![json!({"hash": "a1", "status": "processed"})]);

    let dataset = Dataset::open(&output).unwrap();
    let mut layer = dataset.layer_by_name("parcels").unwrap();
    assert_eq!(layer.feature_count(), 1);

    let field_names: Vec<String> = layer.defn().fields().map(|f| f.name()).collect();
    assert_eq!(
        field_names,
        vec!["JZD", "AREA", "DKBH", "DKMC", "TXSX", "TFH", "DKYT", "DLBM", "WJLJ"]
    );

    let feature = layer.features().next().unwrap();
    let dkbh = feature.field_index("DKBH").unwrap();
    let area = feature.field_index("AREA").unwrap();
    let wjlj = feature.field_index("WJLJ").unwrap();
    let dkmc = feature.field_index("DKMC").unwrap();
    assert_eq!(feature.field_as_string(dkbh).unwrap(), Some("001".to_string()));
    assert_eq!(feature.field_as_double(area).unwrap(), Some(120.5));
    assert_eq!(feature.field_as_string(wjlj).unwrap(), Some("/tmp/a.json".to_string()));
    assert_eq!(feature.field_as_string(dkmc).unwrap(), None);
    assert!(feature.geometry().is_some());
}

#[test]
fn test_scenario_empty_wkt_keeps_attributes() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.gpkg");

    let records = export(job(
        &output,
        true,
        "EPSG:4490",
        json!([parcels(
            "c1",
            "nogeom",
            "EPSG:4490",
            json!([{"properties": {"pid": "7"}, "wkt": ""}])
        )]),
    ));
    assert_eq!(records[0]["status"], "processed");

    let dataset = Dataset::open(&output).unwrap();
    let mut layer = dataset.layer_by_name("nogeom").unwrap();
    let feature = layer.features().next().unwrap();
    assert!(feature.geometry().is_none());
    let dkbh = feature.field_index("DKBH").unwrap();
    assert_eq!(feature.field_as_string(dkbh).unwrap(), Some("7".to_string()));
}

#[test]
fn test_reprojection_and_empty_source_crs() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.gpkg");

    // Source vide -> EPSG:4526 (zone 38, méridien central 114°E)
    let records = export(job(
        &output,
        true,
        "EPSG:4490",
        json!([parcels(
            "b1",
            "projected",
            "",
            json!([{"properties": {}, "wkt": "POINT(38500000 4400000)"}])
        )]),
    ));
    assert_eq!(records[0]["status"], "processed");

    let dataset = Dataset::open(&output).unwrap();
    let mut layer = dataset.layer_by_name("projected").unwrap();
    let feature = layer.features().next().unwrap();
    let (x, y, _) = feature.geometry().unwrap().get_point(0);

    // GDAL respecte l'ordre d'axe lat/lon de EPSG:4490 selon la configuration ;
    // on vérifie les deux ordres possibles.
    let (lon, lat) = if (x - 114.0).abs() < 1.0 { (x, y) } else { (y, x) };
    assert!((lon - 114.0).abs() < 0.01, "lon {}", lon);
    assert!(lat > 39.0 && lat < 40.5, "lat {}", lat);
}

#[test]
fn test_all_features_failing_creates_empty_layer() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.gpkg");

    let records = export(job(
        &output,
        true,
        "EPSG:4490",
        json!([parcels(
            "x1",
            "rejected",
            "EPSG:4490",
            json!([{"properties": {"bp_cnt": "not a number"}, "wkt": "POINT(1 1)"}])
        )]),
    ));

    assert_eq!(records[0]["status"], "processed");
    assert_eq!(layer_count(&output, "rejected"), 0);
}

#[test]
fn test_overwrite_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.gpkg");

    let datasets = json!([
        parcels(
            "i1",
            "first",
            "EPSG:4490",
            json!([{"properties": {"pid": "1"}, "wkt": "POINT(1 1)"}, {"properties": {"pid": "2"}, "wkt": "POINT(2 2)"}])
        ),
        parcels(
            "i2",
            "second",
            "EPSG:4490",
            json!([{"properties": {"pid": "3"}, "wkt": "POINT(3 3)"}])
        ),
    ]);

    let first = export(job(&output, true, "EPSG:4490", datasets.clone()));
    let second = export(job(&output, true, "EPSG:4490", datasets));

    assert_eq!(first, second);
    assert_eq!(layer_count(&output, "first"), 2);
    assert_eq!(layer_count(&output, "second"), 1);
}

#[test]
fn test_failed_dataset_does_not_stop_batch() {
    let dir = tempfile::tempdir().unwrap();
    // Un fichier bloque la création du conteneur attendu comme répertoire parent
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, b"not a directory").unwrap();
    let output = blocker.join("out.gpkg");

    let records = export(job(
        &output,
        true,
        "EPSG:4490",
        json!([
            parcels("f1", "one", "EPSG:4490", json!([])),
            parcels("f2", "two", "EPSG:4490", json!([])),
        ]),
    ));

    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["hash"], "f1");
    assert_eq!(records[1]["hash"], "f2");
    assert!(records.iter().all(|r| r["status"] == "failed"));
    assert!(records.iter().all(|r| r["error"].is_string()));
}

#[test]
fn test_merged_datasets_share_one_layer() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("merged.gpkg");

    let datasets = json!([
        parcels(
            "m1",
            "merged_output",
            "EPSG:4490",
            json!([{"properties": {"pid": "1"}, "wkt": "POINT(1 1)"}, {"properties": {"pid": "2"}, "wkt": "POINT(2 2)"}])
        ),
        parcels(
            "m2",
            "merged_output",
            "EPSG:4490",
            json!([{"properties": {"pid": "3"}, "wkt": "POINT(3 3)"}])
        ),
    ]);

    for overwrite in [false, true] {
        let records = export(job_for("GPKG", &output, overwrite, true, "EPSG:4490", datasets.clone()));
        assert!(records.iter().all(|r| r["status"] == "processed"));
        // Une nouvelle tâche remplace la couche au lieu de la compléter
        assert_eq!(layer_count(&output, "merged_output"), 3);
    }
}

#[test]
fn test_container_without_overwrite_is_recreated() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.gpkg");

    export(job(
        &output,
        true,
        "EPSG:4490",
        json!([parcels("p1", "previous", "EPSG:4490", json!([{"properties": {}, "wkt": "POINT(1 1)"}]))]),
    ));
    assert_eq!(layer_count(&output, "previous"), 1);

    let records = export(job(
        &output,
        false,
        "EPSG:4490",
        json!([
            parcels("n1", "first", "EPSG:4490", json!([{"properties": {}, "wkt": "POINT(1 1)"}])),
            parcels("n2", "second", "EPSG:4490", json!([{"properties": {}, "wkt": "POINT(2 2)"}])),
        ]),
    ));
    assert!(records.iter().all(|r| r["status"] == "processed"));

    // Le fichier existant est recréé, puis complété par la même tâche
    let dataset = Dataset::open(&output).unwrap();
    assert!(dataset.layer_by_name("previous").is_err());
    assert_eq!(layer_count(&output, "first"), 1);
    assert_eq!(layer_count(&output, "second"), 1);
}

#[test]
fn test_shapefile_overwrite_and_encoding() {
    let dir = tempfile::tempdir().unwrap();

    let datasets = json!([parcels(
        "s1",
        "parcels.shp",
        "EPSG:4490",
        json!([
            {"properties": {"pid": "001", "pname": "东城地块"}, "wkt": "POLYGON((0 0,1 0,1 1,0 1,0 0))"},
            {"properties": {"pid": "002"}, "wkt": "POLYGON((1 1,2 1,2 2,1 2,1 1))"}
        ])
    )]);

    for _ in 0..2 {
        let records = export(job_for("SHP", dir.path(), true, false, "EPSG:4490", datasets.clone()));
        assert_eq!(records, vec![json!({"hash": "s1", "status": "processed"})]);
    }

    let shp = dir.path().join("parcels.shp");
    assert!(shp.exists());
    let cpg = std::fs::read_to_string(dir.path().join("parcels.cpg")).unwrap();
    assert_eq!(cpg.trim(), "UTF-8");

    // Nom de couche = nom du fichier sans extension ; pas de doublons après réécriture
    let dataset = Dataset::open(&shp).unwrap();
    let mut layer = dataset.layer_by_name("parcels").unwrap();
    assert_eq!(layer.feature_count(), 2);

    let feature = layer.features().next().unwrap();
    let dkmc = feature.field_index("DKMC").unwrap();
    assert_eq!(feature.field_as_string(dkmc).unwrap(), Some("东城地块".to_string()));
}
