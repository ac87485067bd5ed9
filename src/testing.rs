//! Shared test fixtures: a small shape universe and its native classes

use crate::bridge::Bridge;
use crate::metadata::schema::*;
use crate::metadata::MetaFile;
use metabridge_runtime::{MessageContext, NativeClassBuilder, NativeRuntime, NativeValue, ObjectPtr};
use std::sync::Arc;

pub(crate) fn universe() -> TypeUniverse {
    TypeUniverse {
        interfaces: vec![
            InterfaceSchema {
                name: "Shape".into(),
                protocols: vec!["Drawable".into()],
                methods: vec![
                    MethodSchema::new("area", "area").returns("f64"),
                    MethodSchema::new("scale", "scaleBy:").params(["f64"]),
                    MethodSchema::new("origin", "origin").returns("struct<Point>"),
                    MethodSchema::new("sibling", "sibling").returns("id<Shape>"),
                    MethodSchema::new("describe", "describe:")
                        .params(["id<Shape>"])
                        .returns("string")
                        .class_method(),
                    MethodSchema::new("maxSerial", "maxSerial")
                        .returns("i64")
                        .class_method(),
                ],
                properties: vec![
                    PropertySchema::new("name", "string").readonly(),
                    PropertySchema::new("tag", "i8"),
                ],
                ..Default::default()
            },
            InterfaceSchema {
                name: "Circle".into(),
                base: Some("Shape".into()),
                methods: vec![
                    MethodSchema::new("initWithRadius", "initWithRadius:")
                        .params(["f64"])
                        .returns("id<Circle>")
                        .initializer(),
                    MethodSchema::new("area", "area").returns("f64"),
                    MethodSchema::new("unit", "unitCircle")
                        .returns("id<Circle>")
                        .class_method()
                        .owning(),
                    MethodSchema::new("onResize", "onResize:").params(["block<void(f64)>"]),
                    MethodSchema::new("resizeTo", "resizeTo:").params(["f64"]),
                ],
                properties: vec![PropertySchema::new("radius", "f64")],
                ..Default::default()
            },
            InterfaceSchema {
                name: "Square".into(),
                base: Some("Shape".into()),
                methods: vec![MethodSchema::new("area", "area").returns("f64")],
                properties: vec![PropertySchema::new("side", "f64")],
                ..Default::default()
            },
        ],
        protocols: vec![ProtocolSchema {
            name: "Drawable".into(),
            methods: vec![MethodSchema::new("draw", "drawAt:").params(["struct<Point>"])],
            ..Default::default()
        }],
        structs: vec![StructSchema {
            name: "Point".into(),
            fields: vec![
                FieldSchema {
                    name: "x".into(),
                    ty: "f64".into(),
                },
                FieldSchema {
                    name: "y".into(),
                    ty: "f64".into(),
                },
            ],
        }],
        functions: vec![FunctionSchema {
            name: "hypot".into(),
            params: vec!["f64".into(), "f64".into()],
            returns: "f64".into(),
        }],
    }
}

pub(crate) fn metafile() -> Arc<MetaFile> {
    Arc::new(MetaFile::from_bytes(universe().encode().unwrap()).unwrap())
}

fn f64_ivar(ctx: &MessageContext<'_>, name: &str, default: f64) -> f64 {
    ctx.ivar(name).as_f64().unwrap_or(default)
}

fn shape_area(_ctx: &MessageContext<'_>, _args: &[NativeValue]) -> NativeValue {
    NativeValue::F64(0.0)
}

fn shape_scale(ctx: &MessageContext<'_>, args: &[NativeValue]) -> NativeValue {
    let factor = args[0].as_f64().unwrap_or(1.0);
    ctx.set_ivar("scale", NativeValue::F64(f64_ivar(ctx, "scale", 1.0) * factor));
    NativeValue::Void
}

fn shape_origin(ctx: &MessageContext<'_>, _args: &[NativeValue]) -> NativeValue {
    match ctx.ivar("origin") {
        NativeValue::Struct(fields) => NativeValue::Struct(fields),
        _ => NativeValue::Struct(vec![NativeValue::F64(0.0), NativeValue::F64(0.0)]),
    }
}

fn shape_draw(ctx: &MessageContext<'_>, args: &[NativeValue]) -> NativeValue {
    ctx.set_ivar("origin", args[0].clone());
    NativeValue::Void
}

fn shape_sibling(ctx: &MessageContext<'_>, _args: &[NativeValue]) -> NativeValue {
    NativeValue::Object(ctx.this())
}

fn shape_name(ctx: &MessageContext<'_>, _args: &[NativeValue]) -> NativeValue {
    let runtime = ctx.runtime();
    let name = runtime
        .class_of(ctx.this())
        .and_then(|class| runtime.class_name(class))
        .unwrap_or_default();
    NativeValue::c_string(&name.to_lowercase()).unwrap_or_default()
}

fn shape_tag(ctx: &MessageContext<'_>, _args: &[NativeValue]) -> NativeValue {
    match ctx.ivar("tag") {
        NativeValue::I8(tag) => NativeValue::I8(tag),
        _ => NativeValue::I8(0),
    }
}

fn shape_set_tag(ctx: &MessageContext<'_>, args: &[NativeValue]) -> NativeValue {
    ctx.set_ivar("tag", args[0].clone());
    NativeValue::Void
}

fn shape_describe(ctx: &MessageContext<'_>, args: &[NativeValue]) -> NativeValue {
    let runtime = ctx.runtime();
    let ptr = args[0].as_object().unwrap_or(ObjectPtr::NULL);
    let name = runtime
        .class_of(ptr)
        .and_then(|class| runtime.class_name(class))
        .unwrap_or_else(|| "nil".to_string());
    NativeValue::c_string(&format!("<{}>", name)).unwrap_or_default()
}

fn shape_max_serial(_ctx: &MessageContext<'_>, _args: &[NativeValue]) -> NativeValue {
    NativeValue::I64(i64::MAX)
}

fn circle_init(ctx: &MessageContext<'_>, args: &[NativeValue]) -> NativeValue {
    let radius = args[0].as_f64().unwrap_or(0.0);
    if radius < 0.0 {
        // A failing initializer consumes the allocation
        ctx.runtime().release(ctx.this());
        return NativeValue::Object(ObjectPtr::NULL);
    }
    ctx.set_ivar("radius", NativeValue::F64(radius));
    NativeValue::Object(ctx.this())
}

fn circle_area(ctx: &MessageContext<'_>, _args: &[NativeValue]) -> NativeValue {
    let r = f64_ivar(ctx, "radius", 0.0);
    NativeValue::F64(std::f64::consts::PI * r * r)
}

fn circle_radius(ctx: &MessageContext<'_>, _args: &[NativeValue]) -> NativeValue {
    NativeValue::F64(f64_ivar(ctx, "radius", 0.0))
}

fn circle_set_radius(ctx: &MessageContext<'_>, args: &[NativeValue]) -> NativeValue {
    ctx.set_ivar("radius", args[0].clone());
    NativeValue::Void
}

fn circle_unit(ctx: &MessageContext<'_>, _args: &[NativeValue]) -> NativeValue {
    let runtime = ctx.runtime();
    let Some(class) = runtime.class_named("Circle") else {
        return NativeValue::Object(ObjectPtr::NULL);
    };
    match runtime.alloc(class) {
        Ok(ptr) => {
            runtime.set_ivar(ptr, "radius", NativeValue::F64(1.0));
            NativeValue::Object(ptr)
        }
        Err(_) => NativeValue::Object(ObjectPtr::NULL),
    }
}

fn circle_on_resize(ctx: &MessageContext<'_>, args: &[NativeValue]) -> NativeValue {
    ctx.set_ivar("onResize", args[0].clone());
    NativeValue::Void
}

fn circle_resize_to(ctx: &MessageContext<'_>, args: &[NativeValue]) -> NativeValue {
    ctx.set_ivar("radius", args[0].clone());
    if let NativeValue::Block(Some(block)) = ctx.ivar("onResize") {
        let _ = block.invoke(&[args[0].clone()]);
    }
    NativeValue::Void
}

fn square_area(ctx: &MessageContext<'_>, _args: &[NativeValue]) -> NativeValue {
    let side = f64_ivar(ctx, "side", 0.0);
    NativeValue::F64(side * side)
}

fn square_side(ctx: &MessageContext<'_>, _args: &[NativeValue]) -> NativeValue {
    NativeValue::F64(f64_ivar(ctx, "side", 0.0))
}

fn square_set_side(ctx: &MessageContext<'_>, args: &[NativeValue]) -> NativeValue {
    ctx.set_ivar("side", args[0].clone());
    NativeValue::Void
}

fn hypot(_ctx: &MessageContext<'_>, args: &[NativeValue]) -> NativeValue {
    let x = args[0].as_f64().unwrap_or(0.0);
    let y = args[1].as_f64().unwrap_or(0.0);
    NativeValue::F64(x.hypot(y))
}

/// Runtime with native classes matching `universe()`
pub(crate) fn native_runtime() -> Arc<NativeRuntime> {
    let runtime = NativeRuntime::new();
    runtime
        .register_class(
            NativeClassBuilder::new("Shape")
                .method("area", shape_area)
                .method("scaleBy:", shape_scale)
                .method("origin", shape_origin)
                .method("drawAt:", shape_draw)
                .method("sibling", shape_sibling)
                .method("name", shape_name)
                .method("tag", shape_tag)
                .method("setTag:", shape_set_tag)
                .class_method("describe:", shape_describe)
                .class_method("maxSerial", shape_max_serial),
        )
        .unwrap();
    runtime
        .register_class(
            NativeClassBuilder::new("Circle")
                .superclass("Shape")
                .method("initWithRadius:", circle_init)
                .method("area", circle_area)
                .method("radius", circle_radius)
                .method("setRadius:", circle_set_radius)
                .method("onResize:", circle_on_resize)
                .method("resizeTo:", circle_resize_to)
                .class_method("unitCircle", circle_unit),
        )
        .unwrap();
    runtime
        .register_class(
            NativeClassBuilder::new("Square")
                .superclass("Shape")
                .method("area", square_area)
                .method("side", square_side)
                .method("setSide:", square_set_side),
        )
        .unwrap();
    runtime.register_function("hypot", 2, hypot);
    Arc::new(runtime)
}

pub(crate) fn bridge() -> Bridge {
    Bridge::new(metafile(), native_runtime())
}
