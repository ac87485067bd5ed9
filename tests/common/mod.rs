//! Integration fixture: a small view hierarchy described in metadata and
//! backed by native classes with plain `fn` implementations

#![allow(dead_code)]

use metabridge::metadata::schema::*;
use metabridge::runtime::{MessageContext, NativeClassBuilder, NativeRuntime, NativeValue, ObjectPtr};
use metabridge::{Bridge, MetaFile, TypeUniverse};
use std::sync::Arc;

pub fn universe() -> TypeUniverse {
    TypeUniverse {
        interfaces: vec![
            InterfaceSchema {
                name: "View".into(),
                protocols: vec!["Named".into()],
                methods: vec![
                    MethodSchema::new("initWithFrame", "initWithFrame:")
                        .params(["struct<Rect>"])
                        .returns("id<View>")
                        .initializer(),
                    MethodSchema::new("frame", "frame").returns("struct<Rect>"),
                    MethodSchema::new("addSubview", "addSubview:").params(["id<View>"]),
                    MethodSchema::new("subviewCount", "subviewCount").returns("u32"),
                    MethodSchema::new("superview", "superview").returns("id<View>"),
                    MethodSchema::new("defaultTag", "defaultTag")
                        .returns("i64")
                        .class_method(),
                ],
                properties: vec![PropertySchema::new("tag", "i64")],
                ..Default::default()
            },
            InterfaceSchema {
                name: "Button".into(),
                base: Some("View".into()),
                methods: vec![
                    MethodSchema::new("initWithTitle", "initWithTitle:")
                        .params(["string"])
                        .returns("id<Button>")
                        .initializer(),
                    MethodSchema::new("setAction", "setAction:").params(["block<i32(id<Button>)>"]),
                    MethodSchema::new("press", "press").returns("i32"),
                ],
                properties: vec![
                    PropertySchema::new("title", "string").readonly(),
                    PropertySchema::new("enabled", "bool"),
                ],
                ..Default::default()
            },
        ],
        protocols: vec![ProtocolSchema {
            name: "Named".into(),
            properties: vec![PropertySchema::new("title", "string").readonly()],
            ..Default::default()
        }],
        structs: vec![StructSchema {
            name: "Rect".into(),
            fields: ["x", "y", "w", "h"]
                .into_iter()
                .map(|name| FieldSchema {
                    name: name.into(),
                    ty: "f64".into(),
                })
                .collect(),
        }],
        functions: vec![FunctionSchema {
            name: "clamp".into(),
            params: vec!["i32".into(), "i32".into(), "i32".into()],
            returns: "i32".into(),
        }],
    }
}

pub fn metafile() -> Arc<MetaFile> {
    Arc::new(MetaFile::from_bytes(universe().encode().unwrap()).unwrap())
}

fn view_init(ctx: &MessageContext<'_>, args: &[NativeValue]) -> NativeValue {
    let valid = match &args[0] {
        NativeValue::Struct(fields) => fields.iter().skip(2).all(|f| f.as_f64().unwrap_or(-1.0) >= 0.0),
        _ => false,
    };
    if !valid {
        ctx.runtime().release(ctx.this());
        return NativeValue::Object(ObjectPtr::NULL);
    }
    ctx.set_ivar("frame", args[0].clone());
    NativeValue::Object(ctx.this())
}

fn view_frame(ctx: &MessageContext<'_>, _args: &[NativeValue]) -> NativeValue {
    match ctx.ivar("frame") {
        NativeValue::Struct(fields) => NativeValue::Struct(fields),
        _ => NativeValue::Struct(vec![NativeValue::F64(0.0); 4]),
    }
}

fn view_add_subview(ctx: &MessageContext<'_>, args: &[NativeValue]) -> NativeValue {
    let Some(child) = args[0].as_object().filter(|p| !p.is_null()) else {
        return NativeValue::Void;
    };
    let runtime = ctx.runtime();
    runtime.retain(child);
    runtime.set_ivar(child, "superview", NativeValue::Object(ctx.this()));

    let mut subviews = match ctx.ivar("subviews") {
        NativeValue::Struct(items) => items,
        _ => Vec::new(),
    };
    subviews.push(NativeValue::Object(child));
    ctx.set_ivar("subviews", NativeValue::Struct(subviews));
    NativeValue::Void
}

fn view_subview_count(ctx: &MessageContext<'_>, _args: &[NativeValue]) -> NativeValue {
    match ctx.ivar("subviews") {
        NativeValue::Struct(items) => NativeValue::U32(items.len() as u32),
        _ => NativeValue::U32(0),
    }
}

fn view_superview(ctx: &MessageContext<'_>, _args: &[NativeValue]) -> NativeValue {
    match ctx.ivar("superview") {
        NativeValue::Object(ptr) => NativeValue::Object(ptr),
        _ => NativeValue::Object(ObjectPtr::NULL),
    }
}

fn view_title(_ctx: &MessageContext<'_>, _args: &[NativeValue]) -> NativeValue {
    NativeValue::c_string("view").unwrap_or_default()
}

fn view_tag(ctx: &MessageContext<'_>, _args: &[NativeValue]) -> NativeValue {
    match ctx.ivar("tag") {
        NativeValue::I64(tag) => NativeValue::I64(tag),
        _ => NativeValue::I64(0),
    }
}

fn view_set_tag(ctx: &MessageContext<'_>, args: &[NativeValue]) -> NativeValue {
    ctx.set_ivar("tag", args[0].clone());
    NativeValue::Void
}

fn view_default_tag(_ctx: &MessageContext<'_>, _args: &[NativeValue]) -> NativeValue {
    NativeValue::I64(1 << 53)
}

fn button_init(ctx: &MessageContext<'_>, args: &[NativeValue]) -> NativeValue {
    ctx.set_ivar("title", args[0].clone());
    ctx.set_ivar("frame", NativeValue::Struct(vec![NativeValue::F64(0.0); 4]));
    NativeValue::Object(ctx.this())
}

fn button_title(ctx: &MessageContext<'_>, _args: &[NativeValue]) -> NativeValue {
    match ctx.ivar("title") {
        NativeValue::CString(title) => NativeValue::CString(title),
        _ => NativeValue::CString(None),
    }
}

fn button_set_action(ctx: &MessageContext<'_>, args: &[NativeValue]) -> NativeValue {
    ctx.set_ivar("action", args[0].clone());
    NativeValue::Void
}

/// Counts presses in the `presses` ivar and returns the action's result
fn button_press(ctx: &MessageContext<'_>, _args: &[NativeValue]) -> NativeValue {
    let presses = ctx.ivar("presses").as_i64().unwrap_or(0);
    ctx.set_ivar("presses", NativeValue::I64(presses + 1));
    match ctx.ivar("action") {
        NativeValue::Block(Some(block)) => block
            .invoke(&[NativeValue::Object(ctx.this())])
            .unwrap_or(NativeValue::I32(-1)),
        _ => NativeValue::I32(0),
    }
}

fn button_enabled(ctx: &MessageContext<'_>, _args: &[NativeValue]) -> NativeValue {
    match ctx.ivar("enabled") {
        NativeValue::Bool(on) => NativeValue::Bool(on),
        _ => NativeValue::Bool(false),
    }
}

fn button_set_enabled(ctx: &MessageContext<'_>, args: &[NativeValue]) -> NativeValue {
    ctx.set_ivar("enabled", args[0].clone());
    NativeValue::Void
}

fn clamp(_ctx: &MessageContext<'_>, args: &[NativeValue]) -> NativeValue {
    let v = args[0].as_i64().unwrap_or(0);
    let lo = args[1].as_i64().unwrap_or(0);
    let hi = args[2].as_i64().unwrap_or(0);
    NativeValue::I32(v.clamp(lo, hi.max(lo)) as i32)
}

pub fn native_runtime() -> Arc<NativeRuntime> {
    let runtime = NativeRuntime::new();
    runtime
        .register_class(
            NativeClassBuilder::new("View")
                .method("initWithFrame:", view_init)
                .method("frame", view_frame)
                .method("addSubview:", view_add_subview)
                .method("subviewCount", view_subview_count)
                .method("superview", view_superview)
                .method("title", view_title)
                .method("tag", view_tag)
                .method("setTag:", view_set_tag)
                .class_method("defaultTag", view_default_tag),
        )
        .unwrap();
    runtime
        .register_class(
            NativeClassBuilder::new("Button")
                .superclass("View")
                .method("initWithTitle:", button_init)
                .method("title", button_title)
                .method("setAction:", button_set_action)
                .method("press", button_press)
                .method("enabled", button_enabled)
                .method("setEnabled:", button_set_enabled),
        )
        .unwrap();
    runtime.register_function("clamp", 3, clamp);
    Arc::new(runtime)
}

pub fn bridge() -> Bridge {
    Bridge::new(metafile(), native_runtime())
}

pub fn rect(x: f64, y: f64, w: f64, h: f64) -> metabridge::ScriptValue {
    metabridge::ScriptValue::record([
        ("x", x.into()),
        ("y", y.into()),
        ("w", w.into()),
        ("h", h.into()),
    ])
}
