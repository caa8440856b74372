#![cfg(target_arch = "wasm32")]

use js_sys::{Array, Float64Array, Reflect, Uint32Array};
use lifetiles_wasm::Viewer;
use wasm_bindgen::JsValue;
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

fn is_err(v: &JsValue, code: &str) -> bool {
    if let Ok(ok) =
        Reflect::get(v, &JsValue::from_str("ok")).and_then(|x| x.as_bool().ok_or(JsValue::NULL))
    {
        if ok {
            return false;
        }
        if let Ok(err) = Reflect::get(v, &JsValue::from_str("error")) {
            if let Ok(c) = Reflect::get(&err, &JsValue::from_str("code")) {
                return c.as_string().map_or(false, |s| s == code);
            }
        }
    }
    false
}

fn is_ok(v: &JsValue) -> bool {
    Reflect::get(v, &JsValue::from_str("ok"))
        .ok()
        .and_then(|x| x.as_bool())
        .unwrap_or(false)
}

fn get(v: &JsValue, k: &str) -> JsValue {
    Reflect::get(v, &JsValue::from_str(k)).unwrap()
}

fn graph_json() -> JsValue {
    let text = r#"{
        "vertices": [
            {"id": 0, "start": 0, "end": 10, "unified_start": 0, "unified_end": 10, "content": "ACGTACGTAC", "sources": ["a", "b"]},
            {"id": 1, "start": 10, "end": 12, "unified_start": 10, "unified_end": 12, "content": "GG", "sources": ["a"], "mutation": "deletion"},
            {"id": 2, "start": 10, "end": 11, "unified_start": 12, "unified_end": 13, "content": "T", "sources": ["b"]}
        ],
        "edges": [{"source": 0, "destination": 1}, {"source": 0, "destination": 2}]
    }"#;
    js_sys::JSON::parse(text).unwrap()
}

fn loaded() -> Viewer {
    let mut v = Viewer::new(JsValue::UNDEFINED).unwrap();
    assert!(is_ok(&v.load_graph_res(graph_json())));
    assert!(v.poll_rebuild());
    v
}

#[wasm_bindgen_test]
fn load_and_frame_return_typed_arrays() {
    let mut v = loaded();
    assert_eq!(v.segment_count(), 3);
    assert_eq!(v.max_unified_end(), 13.0);
    assert_eq!(v.segment_content(0).unwrap(), "<10>");
    let f = v.frame(0.5, 0.5);
    assert_eq!(get(&f, "kind").as_string().unwrap(), "tiles");
    let ids: Uint32Array = get(&f, "ids").into();
    assert_eq!(ids.length(), 3);
    let rects: Float64Array = get(&f, "rects").into();
    assert_eq!(rects.length(), 12);
    // Unchanged window.
    assert!(v.frame(0.5, 0.5).is_null());
}

#[wasm_bindgen_test]
fn bad_inputs_return_typed_errors() {
    let mut v = Viewer::new(JsValue::UNDEFINED).unwrap();
    assert!(is_err(&v.set_visible_res(JsValue::NULL), "not_loaded"));
    assert!(is_err(&v.load_graph_res(JsValue::from_f64(3.0)), "json_parse"));
    let mut v = loaded();
    assert!(is_err(&v.frame_res(f64::NAN, 0.1), "non_finite"));
    assert!(is_err(&v.frame_res(0.5, 2.0), "out_of_range"));
    let names = Array::of1(&JsValue::from_str("nobody"));
    assert!(is_err(&v.set_visible_res(names.into()), "unknown_sequence"));
    assert!(is_err(&v.click_res(42), "invalid_reference"));
    assert!(Viewer::new(js_sys::JSON::parse(r#"{"zoom_factor": 0}"#).unwrap()).is_err());
}

#[wasm_bindgen_test]
fn click_filters_and_reports_events() {
    let mut v = loaded();
    v.drain_events();
    v.hover(Some(2));
    let names: Array = v.click(1).into();
    assert_eq!(names.length(), 1);
    assert!(v.poll_rebuild());
    let events: Array = v.drain_events().into();
    let of_type = |t: &str| {
        events
            .iter()
            .find(|e| get(e, "type").as_string().as_deref() == Some(t))
            .unwrap()
    };
    let hovered = of_type("hovered");
    assert_eq!(get(&hovered, "segment").as_f64(), Some(2.0));
    let hovered_sources: Array = get(&hovered, "sources").into();
    assert_eq!(hovered_sources.get(0).as_string().unwrap(), "b");
    let filtered = of_type("filtered");
    assert_eq!(get(&filtered, "segment").as_f64(), Some(1.0));
    let filtered_sources: Array = get(&filtered, "sources").into();
    assert_eq!(filtered_sources.get(0).as_string().unwrap(), "a");
    of_type("index_published");
    assert_eq!(v.visible_segments(0, 10).length(), 2);
}

#[wasm_bindgen_test]
fn zoom_switches_to_stacked_frames() {
    let mut v = loaded();
    assert_eq!(v.set_zoom_level(99), 20);
    assert!(v.is_diagram());
    let f = v.frame(0.0, 1.0);
    assert_eq!(get(&f, "kind").as_string().unwrap(), "stacked");
    assert_eq!(v.goto(13.0), 1.0);
    assert_eq!(v.goto(-4.0), 0.0);
}

#[wasm_bindgen_test]
fn known_mutations_map_to_bookmarks() {
    let mut v = loaded();
    let recs = js_sys::JSON::parse(r#"[{"genome_position": 11, "name": "k"}, {"genome_position": 500}]"#).unwrap();
    let r = v.map_known_mutations_res(recs);
    assert!(is_ok(&r));
    assert_eq!(get(&r, "value").as_f64(), Some(1.0));
    let f = v.frame(0.0, 1.0);
    let marks: Array = get(&f, "bookmarks").into();
    assert_eq!(marks.length(), 1);
}
