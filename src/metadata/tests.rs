//! Tests for the metadata store

use super::schema::*;
use super::*;
use crate::errors::LoadError;

fn universe() -> TypeUniverse {
    TypeUniverse {
        interfaces: vec![
            InterfaceSchema {
                name: "Shape".into(),
                protocols: vec!["Drawable".into()],
                methods: vec![
                    MethodSchema::new("area", "area").returns("f64"),
                    MethodSchema::new("scale", "scaleBy:").params(["f64"]),
                ],
                properties: vec![PropertySchema::new("name", "string").readonly()],
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
                    MethodSchema::new("unit", "unitCircle")
                        .returns("id<Circle>")
                        .class_method(),
                    MethodSchema::new("onResize", "onResize:").params(["block<void(f64)>"]),
                ],
                properties: vec![PropertySchema::new("radius", "f64")],
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

fn load() -> MetaFile {
    MetaFile::from_bytes(universe().encode().unwrap()).unwrap()
}

#[cfg(test)]
mod lookup_tests {
    use super::*;

    #[test]
    fn test_resolve_every_kind() {
        let meta = load();
        assert_eq!(meta.len(), 5);
        assert_eq!(meta.version(), VERSION);

        assert_eq!(meta.resolve("Circle").unwrap().kind(), DescriptorKind::Interface);
        assert_eq!(meta.resolve("Drawable").unwrap().kind(), DescriptorKind::Protocol);
        assert_eq!(meta.resolve("Point").unwrap().kind(), DescriptorKind::Struct);
        assert_eq!(meta.resolve("hypot").unwrap().kind(), DescriptorKind::Function);
        assert!(meta.resolve("Square").is_none());
    }

    #[test]
    fn test_descriptors_in_name_order() {
        let meta = load();
        let names: Vec<&str> = meta.descriptors().map(|d| d.name()).collect();
        assert_eq!(names, vec!["Circle", "Drawable", "Point", "Shape", "hypot"]);
    }

    #[test]
    fn test_identity_is_stable() {
        let meta = load();
        let first = meta.resolve("Shape").unwrap().id();
        let second = meta.resolve("Shape").unwrap().id();
        assert_eq!(first, second);
        assert_eq!(meta.descriptor(first).unwrap().name(), "Shape");
    }

    #[test]
    fn test_unknown_id_rejected() {
        let meta = load();
        assert!(meta.descriptor(DescriptorId(3)).is_none());
    }
}

#[cfg(test)]
mod view_tests {
    use super::*;

    #[test]
    fn test_interface_shape() {
        let meta = load();
        let shape = meta.resolve("Shape").unwrap().id();
        let Some(Descriptor::Interface(circle)) = meta.resolve("Circle") else {
            panic!("Circle is not an interface");
        };

        assert_eq!(circle.base(), Some(shape));
        assert_eq!(circle.protocols().count(), 0);

        let methods = meta.methods_of(&Descriptor::Interface(circle));
        let names: Vec<&str> = methods.iter().map(|m| m.name()).collect();
        assert_eq!(names, vec!["initWithRadius", "unit", "onResize"]);

        assert!(methods[0].is_initializer());
        assert!(methods[1].is_static());
        assert_eq!(methods[1].selector(), "unitCircle");
        assert_eq!(methods[0].signature().params, vec![TypeEncoding::F64]);
    }

    #[test]
    fn test_properties() {
        let meta = load();
        let shape = meta.resolve("Shape").unwrap();
        let circle = meta.resolve("Circle").unwrap();

        let name = meta.properties_of(&shape)[0];
        assert!(name.is_readonly());
        assert_eq!(name.ty(), TypeEncoding::String);
        assert_eq!(name.getter().unwrap().selector(), "name");
        assert!(name.setter().is_none());

        let radius = meta.properties_of(&circle)[0];
        assert!(!radius.is_readonly());
        assert_eq!(radius.setter().unwrap().selector(), "setRadius:");
        assert_eq!(radius.setter().unwrap().signature().params, vec![TypeEncoding::F64]);
    }

    #[test]
    fn test_struct_and_function() {
        let meta = load();
        let Some(Descriptor::Struct(point)) = meta.resolve("Point") else {
            panic!("Point is not a struct");
        };
        let fields = point.fields();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[1].name, "y");
        assert_eq!(fields[1].ty, TypeEncoding::F64);

        let Some(Descriptor::Function(hypot)) = meta.resolve("hypot") else {
            panic!("hypot is not a function");
        };
        assert_eq!(hypot.signature().arity(), 2);
    }

    #[test]
    fn test_type_names() {
        let meta = load();
        let circle = meta.resolve("Circle").unwrap();
        let on_resize = meta.methods_of(&circle)[2];
        let init = meta.methods_of(&circle)[0];

        assert_eq!(meta.signature_text(&on_resize.signature()), "void(block<void(f64)>)");
        assert_eq!(meta.type_name(&init.signature().ret), "id<Circle>");

        let draw = meta.methods_of(&meta.resolve("Drawable").unwrap())[0];
        assert_eq!(meta.type_name(&draw.signature().params[0]), "struct<Point>");
    }
}

#[cfg(test)]
mod load_tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_universe() {
        let meta = MetaFile::from_bytes(TypeUniverse::default().encode().unwrap()).unwrap();
        assert!(meta.is_empty());
        assert_eq!(meta.descriptors().count(), 0);
    }

    #[test]
    fn test_truncated() {
        let mut bytes = universe().encode().unwrap();
        bytes.truncate(bytes.len() - 10);
        assert!(matches!(
            MetaFile::from_bytes(bytes),
            Err(LoadError::Truncated { .. })
        ));

        assert!(matches!(
            MetaFile::from_bytes(vec![0; 8]),
            Err(LoadError::Truncated { expected: 32, actual: 8 })
        ));
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = universe().encode().unwrap();
        bytes[0] = b'X';
        assert!(matches!(MetaFile::from_bytes(bytes), Err(LoadError::BadMagic(_))));
    }

    #[test]
    fn test_unsupported_version() {
        let mut bytes = universe().encode().unwrap();
        bytes[4..6].copy_from_slice(&7u16.to_le_bytes());
        assert!(matches!(
            MetaFile::from_bytes(bytes),
            Err(LoadError::UnsupportedVersion { found: 7, supported: 1 })
        ));
    }

    #[test]
    fn test_corrupt_descriptor_kind() {
        let bytes = universe().encode().unwrap();
        let desc_off = u32::from_le_bytes([bytes[20], bytes[21], bytes[22], bytes[23]]) as usize;

        let mut corrupt = bytes.clone();
        corrupt[desc_off] = 42;
        assert!(matches!(
            MetaFile::from_bytes(corrupt),
            Err(LoadError::UnknownTag { tag: 42, .. })
        ));
    }

    #[test]
    fn test_load_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&universe().encode().unwrap()).unwrap();

        let meta = MetaFile::load(file.path()).unwrap();
        assert!(meta.resolve("Circle").is_some());
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = MetaFile::load(dir.path().join(MetaFile::default_file_name())).unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }

    #[test]
    fn test_default_file_name() {
        let name = MetaFile::default_file_name();
        assert!(name.starts_with("metadata-"));
        assert!(name.ends_with(".bin"));
    }
}

#[cfg(test)]
mod schema_tests {
    use super::*;
    use crate::errors::SchemaError;

    #[test]
    fn test_parse_types() {
        assert_eq!(parse_type("i32").unwrap(), TypeRef::Primitive(TypeEncoding::I32));
        assert_eq!(parse_type("id").unwrap(), TypeRef::Object(None));
        assert_eq!(
            parse_type(" id< Shape > ").unwrap(),
            TypeRef::Object(Some("Shape".into()))
        );
        assert_eq!(
            parse_type("block<bool(i32, block<void()>)>").unwrap(),
            TypeRef::Block(
                Box::new(TypeRef::Primitive(TypeEncoding::Bool)),
                vec![
                    TypeRef::Primitive(TypeEncoding::I32),
                    TypeRef::Block(Box::new(TypeRef::Primitive(TypeEncoding::Void)), vec![]),
                ]
            )
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(parse_type("int"), Err(SchemaError::UnknownType(_))));
        assert!(matches!(parse_type("id<Shape"), Err(SchemaError::BadType { .. })));
        assert!(matches!(parse_type("i32 i32"), Err(SchemaError::BadType { .. })));
    }

    #[test]
    fn test_unknown_reference() {
        let mut universe = universe();
        universe.interfaces[0].base = Some("Polygon".into());
        assert!(matches!(universe.encode(), Err(SchemaError::UnknownType(name)) if name == "Polygon"));
    }

    #[test]
    fn test_duplicate_declaration() {
        let mut universe = universe();
        universe.structs.push(StructSchema {
            name: "Shape".into(),
            fields: vec![],
        });
        assert!(matches!(universe.encode(), Err(SchemaError::Duplicate(_))));
    }

    #[test]
    fn test_json_universe() {
        let universe = TypeUniverse::from_json(
            r#"{
                "interfaces": [{
                    "name": "Counter",
                    "methods": [{ "name": "increment", "selector": "increment", "returns": "i64" }],
                    "properties": [{ "name": "count", "type": "i64", "readonly": true }]
                }]
            }"#,
        )
        .unwrap();

        let meta = MetaFile::from_bytes(universe.encode().unwrap()).unwrap();
        let counter = meta.resolve("Counter").unwrap();
        assert_eq!(meta.methods_of(&counter)[0].signature().ret, TypeEncoding::I64);
        assert!(meta.properties_of(&counter)[0].is_readonly());
    }
}
