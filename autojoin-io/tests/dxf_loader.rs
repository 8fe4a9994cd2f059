
use std::fs;
use std::path::PathBuf;

use autojoin_core::drawing::Entity;
use autojoin_core::primitive::Shape;
use autojoin_engine::{JoinOptions, plan_drawing};
use autojoin_io::{DocumentLoader, DocumentSaver, DxfFacade, IoError};
use serde_json::json;
use snapshot::snapshot;

fn fixture(name: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests/data");
    path.push(name);
    path
}

#[test]
fn load_square_with_hole_matches_expected_drawing() {
    let loader = DxfFacade::new();
    let drawing = loader
        .load(&fixture("square_with_hole.dxf"))
        .expect("读取 DXF 失败");

    let expected = json!({
        "version": "AC1032",
        "units": 4,
        "layers": [
            { "name": "0", "color": 7 },
            { "name": "OUTLINE", "color": 1 },
            { "name": "HOLES", "color": null },
            { "name": "NOTES", "color": null },
        ],
        "entities": [
            { "kind": "LINE", "layer": "OUTLINE", "color": null,
              "data": { "start": [0.0, 0.0], "end": [40.0, 0.0] } },
            { "kind": "LINE", "layer": "OUTLINE", "color": 3,
              "data": { "start": [40.0, 0.0], "end": [40.0, 30.0] } },
            { "kind": "LINE", "layer": "OUTLINE", "color": null,
              "data": { "start": [40.0, 30.0], "end": [0.0, 30.0] } },
            { "kind": "LINE", "layer": "OUTLINE", "color": null,
              "data": { "start": [0.0, 30.0], "end": [0.0, 0.0] } },
            { "kind": "CIRCLE", "layer": "HOLES", "color": null,
              "data": { "center": [20.0, 15.0], "radius": 4.0 } },
            { "kind": "TEXT", "layer": "NOTES", "color": null,
              "data": { "pairs": [
                  [8, "NOTES"], [10, "1.0"], [20, "32.0"], [40, "2.5"], [1, "PLATE-A"]
              ] } },
        ],
    });
    assert_eq!(snapshot(&drawing), expected);
}

#[test]
fn blocks_are_kept_without_handles() {
    let drawing = DxfFacade::new()
        .load(&fixture("square_with_hole.dxf"))
        .expect("读取 DXF 失败");
    let blocks = drawing.blocks();
    assert_eq!(blocks.first(), Some(&(0, "BLOCK".to_string())));
    assert!(blocks.iter().any(|(code, value)| *code == 2 && value == "MARK"));
    assert!(blocks.iter().all(|(code, _)| *code != 5 && *code != 330));
}

#[test]
fn arc_angles_are_read_in_degrees() {
    let drawing = DxfFacade::new()
        .load(&fixture("slot.dxf"))
        .expect("读取 DXF 失败");
    assert_eq!(drawing.header().version.as_deref(), Some("AC1015"));

    let arcs: Vec<_> = drawing
        .entities()
        .filter_map(|item| match &item.entity {
            Entity::Arc(arc) => Some(*arc),
            _ => None,
        })
        .collect();
    assert_eq!(arcs.len(), 2);
    assert!((arcs[0].start_angle - 270f64.to_radians()).abs() < 1e-12);
    assert!((arcs[0].end_angle - 90f64.to_radians()).abs() < 1e-12);
    assert!(arcs[0].start_point().is_near(autojoin_core::geometry::Point2::new(5.0, -2.0), 1e-9));
}

#[test]
fn missing_file_reports_read_error() {
    let err = DxfFacade::new()
        .load(&fixture("does_not_exist.dxf"))
        .unwrap_err();
    assert!(matches!(err, IoError::ReadError { .. }));
}

#[test]
fn tilted_extrusion_is_unsupported() {
    let source = "0\nSECTION\n2\nENTITIES\n0\nCIRCLE\n10\n0\n20\n0\n40\n1\n210\n0.6\n220\n0\n230\n0.8\n0\nENDSEC\n0\nEOF\n";
    let err = DxfFacade::new().parse_str(source).unwrap_err();
    assert!(matches!(err, IoError::UnsupportedFeature(_)));
}

#[test]
fn joined_drawing_survives_a_write_and_reload() {
    let facade = DxfFacade::new();
    let source = facade
        .load(&fixture("square_with_hole.dxf"))
        .expect("读取 DXF 失败");
    let plan = plan_drawing(&source, &JoinOptions::default()).expect("计划失败");
    let mut output = source.carry_over();
    plan.emit(&mut output).expect("写入内存图纸不会失败");

    let dir = tempfile::tempdir().expect("创建临时目录失败");
    let path = dir.path().join("plate-auto-bound.dxf");
    facade.save(&output, &path).expect("写出 DXF 失败");
    assert!(!dir.path().join("plate-auto-bound.dxf.partial").exists());

    let text = fs::read_to_string(&path).expect("读取输出失败");
    assert!(text.contains("LWPOLYLINE"));
    assert!(text.contains("Part 1 - Contained"));

    let reloaded = facade.load(&path).expect("重新读取输出失败");
    let expected = json!({
        "version": "AC1032",
        "units": 4,
        "layers": [
            { "name": "0", "color": 7 },
            { "name": "OUTLINE", "color": 1 },
            { "name": "HOLES", "color": 7 },
            { "name": "NOTES", "color": 7 },
            { "name": "Part 1", "color": 7 },
            { "name": "Part 1 - Contained", "color": 7 },
        ],
        "entities": [
            { "kind": "TEXT", "layer": "NOTES", "color": null,
              "data": { "pairs": [
                  [8, "NOTES"], [10, "1.0"], [20, "32.0"], [40, "2.5"], [1, "PLATE-A"]
              ] } },
            { "kind": "LWPOLYLINE", "layer": "Part 1", "color": null,
              "data": { "pairs": [
                  [8, "Part 1"], [90, "4"], [70, "1"],
                  [10, "0"], [20, "0"], [10, "40"], [20, "0"],
                  [10, "40"], [20, "30"], [10, "0"], [20, "30"]
              ] } },
            { "kind": "CIRCLE", "layer": "Part 1 - Contained", "color": null,
              "data": { "center": [20.0, 15.0], "radius": 4.0 } },
        ],
    });
    assert_eq!(snapshot(&reloaded), expected);

    let primitives = reloaded.primitives().expect("重新读取的几何应合法");
    assert!(matches!(primitives[0].shape(), Shape::Circle(_)));
}

#[test]
fn paper_space_geometry_is_passed_through() {
    let source = "0\nSECTION\n2\nENTITIES\n\
                  0\nLINE\n8\n0\n10\n0\n20\n0\n11\n5\n21\n0\n\
                  0\nLINE\n8\nTITLE\n67\n1\n10\n0\n20\n0\n11\n5\n21\n0\n\
                  0\nCIRCLE\n8\nTITLE\n67\n1\n10\n1\n20\n1\n40\n0.5\n\
                  0\nENDSEC\n0\nEOF\n";
    let facade = DxfFacade::new();
    let drawing = facade.parse_str(source).expect("解析失败");

    let primitives = drawing.primitives().expect("几何应合法");
    assert_eq!(primitives.len(), 1);
    let kinds: Vec<_> = drawing
        .entities()
        .map(|item| match &item.entity {
            Entity::Raw(raw) => format!("raw {}", raw.kind),
            Entity::Line(_) => "line".to_string(),
            other => format!("{other:?}"),
        })
        .collect();
    assert_eq!(kinds, vec!["line", "raw LINE", "raw CIRCLE"]);

    let text = facade.to_dxf_string(&drawing.carry_over());
    assert_eq!(text.matches(" 67\n1\n").count(), 2);
}

#[test]
fn linetype_and_true_color_survive_joining() {
    let source = "0\nSECTION\n2\nENTITIES\n\
                  0\nLINE\n8\nCUT\n6\nDASHED\n62\n1\n420\n16711680\n10\n0\n20\n0\n11\n5\n21\n0\n\
                  0\nLINE\n8\nCUT\n10\n5\n20\n0\n11\n5\n21\n5\n\
                  0\nENDSEC\n0\nEOF\n";
    let facade = DxfFacade::new();
    let source = facade.parse_str(source).expect("解析失败");
    let first = source.entities().next().expect("至少一个实体");
    assert_eq!(first.style.linetype.as_deref(), Some("DASHED"));
    assert_eq!(first.style.true_color, Some(0xFF0000));

    let plan = plan_drawing(&source, &JoinOptions::default()).expect("计划失败");
    let mut output = source.carry_over();
    plan.emit(&mut output).expect("写入内存图纸不会失败");
    let text = facade.to_dxf_string(&output);
    assert!(text.contains("LWPOLYLINE\n  8\nPart 1\n  6\nDASHED\n 62\n1\n420\n16711680\n"));
}
