use crate::error;
use crate::interop::{arr_f64, arr_u32, arr_u8, new_obj, set_kv};
use crate::Viewer;
use js_sys::Uint32Array;
use lifetiles::viewport::Rect;
use lifetiles::{Color, Frame, GeneAnnotation, KnownMutation, Mutation, VertexRecord, ViewConfig};
use serde::de::DeserializeOwned;
use wasm_bindgen::prelude::*;

fn to_js<T: serde::Serialize + ?Sized>(v: &T) -> JsValue {
    serde_wasm_bindgen::to_value(v).unwrap_or(JsValue::NULL)
}

fn from_js<T: DeserializeOwned>(v: JsValue) -> Result<T, JsValue> {
    serde_wasm_bindgen::from_value(v).map_err(error::bad_input)
}

fn push_rect(out: &mut Vec<f64>, r: &Rect) {
    out.extend_from_slice(&[r.x, r.y, r.width, r.height]);
}

fn push_rgba(out: &mut Vec<u8>, c: Color) {
    out.extend_from_slice(&[c.r, c.g, c.b, c.a]);
}

fn check_scroll(h: f64, t: f64) -> Option<JsValue> {
    if !h.is_finite() {
        return Some(error::non_finite("h"));
    }
    if !t.is_finite() {
        return Some(error::non_finite("t"));
    }
    if !(0.0..=1.0).contains(&h) {
        return Some(error::out_of_range("h", 0.0, 1.0, h));
    }
    if !(0.0..=1.0).contains(&t) {
        return Some(error::out_of_range("t", 0.0, 1.0, t));
    }
    None
}

/// `null` when nothing changed; otherwise flat typed arrays, four entries per
/// tile for `rects` and `rgba`, two (start, height) for `lanes`.
fn frame_to_js(frame: Frame) -> JsValue {
    let o = new_obj();
    let mut ids = Vec::new();
    let mut lanes = Vec::new();
    let mut rects = Vec::new();
    let mut rgba = Vec::new();
    match frame {
        Frame::Unchanged => return JsValue::NULL,
        Frame::Tiles(f) => {
            set_kv(&o, "kind", &JsValue::from_str("tiles"));
            set_kv(&o, "start_bucket", &JsValue::from_f64(f.start_bucket as f64));
            set_kv(&o, "end_bucket", &JsValue::from_f64(f.end_bucket as f64));
            set_kv(&o, "lane_count", &JsValue::from_f64(f.lane_count as f64));
            let mut collapsed = Vec::with_capacity(f.tiles.len());
            let mut bookmarks = Vec::new();
            let mut annotations = Vec::new();
            for t in &f.tiles {
                ids.push(t.segment);
                lanes.extend_from_slice(&[t.lane_start, t.lane_height]);
                push_rect(&mut rects, &t.rect);
                push_rgba(&mut rgba, t.color);
                collapsed.push(t.collapsed as u8);
                bookmarks.extend(t.bookmarks.iter());
                if !t.annotations.is_empty() {
                    annotations.push((t.segment, &t.annotations));
                }
            }
            set_kv(&o, "collapsed", &arr_u8(&collapsed).into());
            set_kv(&o, "bookmarks", &to_js(&bookmarks));
            set_kv(&o, "annotations", &to_js(&annotations));
        }
        Frame::Stacked(f) => {
            set_kv(&o, "kind", &JsValue::from_str("stacked"));
            set_kv(&o, "start_bucket", &JsValue::from_f64(f.start_bucket as f64));
            set_kv(&o, "end_bucket", &JsValue::from_f64(f.end_bucket as f64));
            set_kv(&o, "lane_count", &JsValue::from_f64(f.lane_count as f64));
            set_kv(&o, "depth", &JsValue::from_f64(f.depth as f64));
            let mut groups = Vec::with_capacity(f.tiles.len());
            let mut members = Vec::with_capacity(f.tiles.len());
            for t in &f.tiles {
                ids.push(t.representative);
                groups.push(t.group);
                members.push(t.members);
                lanes.extend_from_slice(&[t.lane_start, t.lane_height]);
                push_rect(&mut rects, &t.rect);
                push_rgba(&mut rgba, t.color);
            }
            set_kv(&o, "groups", &arr_u32(&groups).into());
            set_kv(&o, "members", &arr_u32(&members).into());
        }
    }
    set_kv(&o, "ids", &arr_u32(&ids).into());
    set_kv(&o, "lanes", &arr_u32(&lanes).into());
    set_kv(&o, "rects", &arr_f64(&rects).into());
    set_kv(&o, "rgba", &arr_u8(&rgba).into());
    o.into()
}

#[wasm_bindgen]
impl Viewer {
    /// `config` may be `undefined` or a partial config object.
    #[wasm_bindgen(constructor)]
    pub fn new(config: JsValue) -> Result<Viewer, JsValue> {
        if config.is_undefined() || config.is_null() {
            return Ok(Viewer::rs_new(ViewConfig::default()));
        }
        let v: serde_json::Value = from_js(config)?;
        ViewConfig::from_json_value(v)
            .map(Viewer::rs_new)
            .map_err(|e| error::core(&e))
    }

    // Graph
    pub fn load_graph(&mut self, v: JsValue) -> bool {
        match from_js::<serde_json::Value>(v) {
            Ok(value) => self.inner.load_json(value).is_ok(),
            Err(_) => false,
        }
    }
    pub fn load_graph_res(&mut self, v: JsValue) -> JsValue {
        let value: serde_json::Value = match from_js(v) {
            Ok(x) => x,
            Err(e) => return e,
        };
        let r = self.inner.load_json(value);
        error::from_result(r, |_| JsValue::from_f64(self.inner.graph().map_or(0, |g| g.segment_count()) as f64))
    }
    pub fn segment_count(&self) -> u32 {
        self.inner.graph().map_or(0, |g| g.segment_count())
    }
    pub fn edge_count(&self) -> u32 {
        self.inner.graph().map_or(0, |g| g.edge_count())
    }
    pub fn sequences(&self) -> JsValue {
        match self.inner.graph() {
            Some(g) => to_js(g.sequences()),
            None => JsValue::NULL,
        }
    }
    pub fn segment_content(&self, id: u32) -> Option<String> {
        let g = self.inner.graph()?;
        g.segment(id).map(|s| s.content.to_string())
    }
    pub fn max_unified_end(&self) -> f64 {
        self.inner.max_unified_end() as f64
    }
    pub fn goto(&self, position: f64) -> f64 {
        if !position.is_finite() || position <= 0.0 {
            return 0.0;
        }
        self.inner.goto(position as u64)
    }

    // Filter and reference
    /// `names` is an array of sequence names, or `null` to show all.
    pub fn set_visible(&mut self, names: JsValue) -> bool {
        match from_js::<Option<Vec<String>>>(names) {
            Ok(names) => self.inner.set_visible(names.as_deref()).is_ok(),
            Err(_) => false,
        }
    }
    pub fn set_visible_res(&mut self, names: JsValue) -> JsValue {
        let names: Option<Vec<String>> = match from_js(names) {
            Ok(x) => x,
            Err(e) => return e,
        };
        let r = self.inner.set_visible(names.as_deref());
        self.finish(r, |_| JsValue::TRUE)
    }
    pub fn set_reference(&mut self, name: Option<String>) -> bool {
        self.inner.set_reference(name.as_deref()).is_ok()
    }
    pub fn set_reference_res(&mut self, name: Option<String>) -> JsValue {
        let r = self.inner.set_reference(name.as_deref());
        self.finish(r, |_| JsValue::TRUE)
    }
    pub fn set_mutation_res(&mut self, id: u32, kind: JsValue) -> JsValue {
        let kind: Option<Mutation> = match from_js(kind) {
            Ok(x) => x,
            Err(e) => return e,
        };
        let r = self.inner.set_mutation(id, kind);
        self.finish(r, |_| JsValue::TRUE)
    }
    pub fn graft_segment_res(&mut self, edge: u32, record: JsValue) -> JsValue {
        let rec: VertexRecord = match from_js(record) {
            Ok(x) => x,
            Err(e) => return e,
        };
        let r = self.inner.graft_segment(edge, &rec);
        self.finish(r, |id| JsValue::from_f64(id as f64))
    }

    // Known mutations and annotations
    /// Returns the number of records that matched no segment, or -1 on error.
    pub fn map_known_mutations(&mut self, records: JsValue) -> i32 {
        let records: Vec<KnownMutation> = match from_js(records) {
            Ok(x) => x,
            Err(_) => return -1,
        };
        self.inner.map_known_mutations(records).map_or(-1, |n| n as i32)
    }
    pub fn map_known_mutations_res(&mut self, records: JsValue) -> JsValue {
        let records: Vec<KnownMutation> = match from_js(records) {
            Ok(x) => x,
            Err(e) => return e,
        };
        let r = self.inner.map_known_mutations(records);
        self.finish(r, |n| JsValue::from_f64(n as f64))
    }
    pub fn map_annotations(&mut self, records: JsValue) -> i32 {
        let records: Vec<GeneAnnotation> = match from_js(records) {
            Ok(x) => x,
            Err(_) => return -1,
        };
        self.inner.map_annotations(records).map_or(-1, |n| n as i32)
    }
    pub fn map_annotations_res(&mut self, records: JsValue) -> JsValue {
        let records: Vec<GeneAnnotation> = match from_js(records) {
            Ok(x) => x,
            Err(e) => return e,
        };
        let r = self.inner.map_annotations(records);
        self.finish(r, |n| JsValue::from_f64(n as f64))
    }

    // Zoom
    pub fn zoom_level(&self) -> u32 {
        self.inner.zoom_level()
    }
    pub fn set_zoom_level(&mut self, level: u32) -> u32 {
        self.inner.set_zoom_level(level)
    }
    pub fn zoom_in(&mut self) -> u32 {
        self.inner.zoom_in()
    }
    pub fn zoom_out(&mut self) -> u32 {
        self.inner.zoom_out()
    }
    pub fn scale(&self) -> f64 {
        self.inner.viewport().scale()
    }
    pub fn is_diagram(&self) -> bool {
        self.inner.viewport().is_diagram()
    }

    // Frames
    pub fn frame(&mut self, h: f64, t: f64) -> JsValue {
        if check_scroll(h, t).is_some() {
            return JsValue::NULL;
        }
        match self.inner.frame(h, t) {
            Ok(f) => frame_to_js(f),
            Err(_) => JsValue::NULL,
        }
    }
    pub fn frame_res(&mut self, h: f64, t: f64) -> JsValue {
        if let Some(e) = check_scroll(h, t) {
            return e;
        }
        let r = self.inner.frame(h, t);
        error::from_result(r, frame_to_js)
    }
    pub fn visible_segments(&self, start: u32, end: u32) -> Uint32Array {
        arr_u32(&self.inner.visible_segments(start as usize, end as usize))
    }
    pub fn poll_rebuild(&mut self) -> bool {
        self.inner.poll_rebuild().unwrap_or(false)
    }
    pub fn poll_rebuild_res(&mut self) -> JsValue {
        let r = self.inner.poll_rebuild();
        error::from_result(r, JsValue::from_bool)
    }
    pub fn rebuild_pending(&self) -> bool {
        self.inner.rebuild_pending()
    }

    // Interaction
    /// Source names of the clicked segment, or `null` for an unknown id.
    pub fn click(&mut self, id: u32) -> JsValue {
        match self.inner.click(id) {
            Ok(names) => to_js(&names),
            Err(_) => JsValue::NULL,
        }
    }
    pub fn click_res(&mut self, id: u32) -> JsValue {
        let r = self.inner.click(id);
        error::from_result(r, |names| to_js(&names))
    }
    pub fn hover(&mut self, id: Option<u32>) {
        self.inner.hover(id)
    }
    pub fn drain_events(&mut self) -> JsValue {
        to_js(&self.inner.drain_events())
    }
}

impl Viewer {
    fn finish<T>(&self, r: lifetiles::Result<T>, f: impl FnOnce(T) -> JsValue) -> JsValue {
        if let Err(e) = &r {
            log::warn!("viewer call failed: {}", e);
        }
        error::from_result(r, f)
    }
}
