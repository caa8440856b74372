use crate::interop::{new_obj, set_kv};
use wasm_bindgen::prelude::*;

pub fn ok(v: JsValue) -> JsValue {
    let o = new_obj();
    set_kv(&o, "ok", &JsValue::from_bool(true));
    set_kv(&o, "value", &v);
    o.into()
}

pub fn err(code: &'static str, message: impl Into<String>, data: Option<JsValue>) -> JsValue {
    let root = new_obj();
    set_kv(&root, "ok", &JsValue::from_bool(false));
    let e = new_obj();
    set_kv(&e, "code", &JsValue::from_str(code));
    set_kv(&e, "message", &JsValue::from_str(&message.into()));
    if let Some(d) = data { set_kv(&e, "data", &d); }
    set_kv(&root, "error", &e.into());
    root.into()
}

/// Envelope for a core error. Reference and content errors carry the
/// offending values in `data`.
pub fn core(e: &lifetiles::Error) -> JsValue {
    let data = match e {
        lifetiles::Error::InvalidReference { kind, id } => {
            let d = new_obj();
            set_kv(&d, "kind", &JsValue::from_str(kind));
            set_kv(&d, "id", &JsValue::from_f64(*id as f64));
            Some(d.into())
        }
        lifetiles::Error::ContentLength { len, span } => {
            let d = new_obj();
            set_kv(&d, "len", &JsValue::from_f64(*len as f64));
            set_kv(&d, "span", &JsValue::from_f64(*span as f64));
            Some(d.into())
        }
        lifetiles::Error::UnknownSequence(name) => {
            let d = new_obj();
            set_kv(&d, "name", &JsValue::from_str(name));
            Some(d.into())
        }
        _ => None,
    };
    err(e.code(), e.to_string(), data)
}

pub fn from_result<T>(r: lifetiles::Result<T>, f: impl FnOnce(T) -> JsValue) -> JsValue {
    match r {
        Ok(v) => ok(f(v)),
        Err(e) => core(&e),
    }
}

#[inline]
pub fn non_finite(param: &str) -> JsValue {
    let d = new_obj(); set_kv(&d, "param", &JsValue::from_str(param));
    err("non_finite", format!("parameter '{}' must be finite", param), Some(d.into()))
}

#[inline]
pub fn out_of_range(param: &str, min: f64, max: f64, got: f64) -> JsValue {
    let d = new_obj();
    set_kv(&d, "param", &JsValue::from_str(param));
    set_kv(&d, "min", &JsValue::from_f64(min));
    set_kv(&d, "max", &JsValue::from_f64(max));
    set_kv(&d, "got", &JsValue::from_f64(got));
    err("out_of_range", format!("parameter '{}' out of range", param), Some(d.into()))
}

pub fn bad_input(e: serde_wasm_bindgen::Error) -> JsValue {
    err("json_parse", e.to_string(), None)
}
