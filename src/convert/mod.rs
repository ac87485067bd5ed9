//! Value converter - scripting values to native slots and back
//!
//! Conversion is driven entirely by the type encoding from the metadata:
//! the same scripting value converts differently for an `i8` slot and a
//! `double` slot. Failures carry the expected encoding and the actual value
//! kind; the call site adds the member and argument position.
//!
//! Integer mapping: 8/16/32-bit integers and floats become `Number`. 64-bit
//! integers become `Number` within the exactly representable range
//! (|v| <= 2^53) and `BigInt` beyond it.


use crate::bridge::Bridge;
use crate::errors::BridgeError;
use crate::metadata::{Descriptor, DescriptorId, Signature, TypeEncoding};
use crate::script::{ScriptFunction, ScriptValue};
use metabridge_runtime::{NativeBlock, NativeValue, ObjectPtr};
use num_traits::FromPrimitive;
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Largest integer magnitude a `Number` holds exactly
pub const MAX_SAFE_INTEGER: u64 = 1 << 53;

/// Argument frame for one native call
pub type NativeFrame = SmallVec<[NativeValue; 4]>;

/// Converter bound to one bridge
pub struct ValueConverter<'b> {
    bridge: &'b Bridge,
}

impl<'b> ValueConverter<'b> {
    pub(crate) fn new(bridge: &'b Bridge) -> Self {
        Self { bridge }
    }

    /// Convert a scripting value for a native slot of type `ty`
    pub fn to_native(&self, value: &ScriptValue, ty: &TypeEncoding) -> Result<NativeValue, BridgeError> {
        self.native(value, ty).map_err(|err| self.failed(err))
    }

    /// Convert a native value that the bridge does not take ownership of
    pub fn to_scripting(&self, value: NativeValue, ty: &TypeEncoding) -> Result<ScriptValue, BridgeError> {
        self.to_scripting_owned(value, ty, false)
    }

    /// Convert a native value; `owning` says an object result arrives with a
    /// reference the wrapper takes over
    pub fn to_scripting_owned(
        &self,
        value: NativeValue,
        ty: &TypeEncoding,
        owning: bool,
    ) -> Result<ScriptValue, BridgeError> {
        let handed_over = match &value {
            NativeValue::Object(ptr) if owning && !ptr.is_null() => Some(*ptr),
            _ => None,
        };
        self.scripting(value, ty, owning).map_err(|err| {
            // No wrapper took the reference over, so give it back
            if let Some(ptr) = handed_over {
                self.bridge.runtime().release(ptr);
            }
            self.failed(err)
        })
    }

    /// Convert arguments in signature order, attaching `member` to failures
    pub(crate) fn frame(
        &self,
        member: &str,
        params: &[TypeEncoding],
        args: &[ScriptValue],
    ) -> Result<NativeFrame, BridgeError> {
        let mut frame = NativeFrame::with_capacity(args.len());
        for (i, (arg, ty)) in args.iter().zip(params).enumerate() {
            frame.push(self.to_native(arg, ty).map_err(|err| err.at(member, Some(i)))?);
        }
        Ok(frame)
    }

    fn failed(&self, err: BridgeError) -> BridgeError {
        self.bridge.note_conversion_error();
        debug!(event = "conversion_failed", error = %err, "conversion failed");
        err
    }

    fn type_name(&self, ty: &TypeEncoding) -> String {
        self.bridge.meta().type_name(ty)
    }

    fn native(&self, value: &ScriptValue, ty: &TypeEncoding) -> Result<NativeValue, BridgeError> {
        let expected = || self.type_name(ty);
        match ty {
            TypeEncoding::Void => Ok(NativeValue::Void),
            TypeEncoding::Bool => match *value {
                ScriptValue::Bool(b) => Ok(NativeValue::Bool(b)),
                _ => Err(BridgeError::mismatch(expected(), value.describe_kind())),
            },
            TypeEncoding::I8 => integer(value, "i8").map(NativeValue::I8),
            TypeEncoding::I16 => integer(value, "i16").map(NativeValue::I16),
            TypeEncoding::I32 => integer(value, "i32").map(NativeValue::I32),
            TypeEncoding::I64 => integer(value, "i64").map(NativeValue::I64),
            TypeEncoding::U8 => integer(value, "u8").map(NativeValue::U8),
            TypeEncoding::U16 => integer(value, "u16").map(NativeValue::U16),
            TypeEncoding::U32 => integer(value, "u32").map(NativeValue::U32),
            TypeEncoding::U64 => integer(value, "u64").map(NativeValue::U64),
            TypeEncoding::F32 => {
                let n = float(value, "f32")?;
                if n.is_finite() && n.abs() > f64::from(f32::MAX) {
                    return Err(BridgeError::conversion("f32", value.describe_kind(), "out of range"));
                }
                Ok(NativeValue::F32(n as f32))
            }
            TypeEncoding::F64 => float(value, "f64").map(NativeValue::F64),
            TypeEncoding::String => match value {
                ScriptValue::String(s) => NativeValue::c_string(s).ok_or_else(|| {
                    BridgeError::conversion("string", "string", "contains an interior NUL")
                }),
                v if v.is_nullish() => Ok(NativeValue::CString(None)),
                _ => Err(BridgeError::mismatch(expected(), value.describe_kind())),
            },
            TypeEncoding::Object(constraint) => match value {
                ScriptValue::Object(wrapper) => {
                    if wrapper.is_released() {
                        return Err(BridgeError::ReleasedInstance {
                            class: wrapper.class().name().to_string(),
                            address: wrapper.ptr().addr(),
                        });
                    }
                    if !self.bridge.registry().is_current(wrapper) {
                        return Err(BridgeError::conversion(
                            "object",
                            value.describe_kind(),
                            "instance was destroyed",
                        ));
                    }
                    match constraint {
                        Some(id) if !wrapper.class().is_compatible(*id) => {
                            Err(BridgeError::mismatch(expected(), value.describe_kind()))
                        }
                        _ => Ok(NativeValue::Object(wrapper.ptr())),
                    }
                }
                v if v.is_nullish() => Ok(NativeValue::Object(ObjectPtr::NULL)),
                _ => Err(BridgeError::mismatch(expected(), value.describe_kind())),
            },
            TypeEncoding::Class => match value {
                ScriptValue::Constructor(class) => match class.native_class() {
                    Some(id) => Ok(NativeValue::Class(Some(id))),
                    None => Err(BridgeError::conversion(
                        "class",
                        value.describe_kind(),
                        "no native class backs it",
                    )),
                },
                v if v.is_nullish() => Ok(NativeValue::Class(None)),
                _ => Err(BridgeError::mismatch(expected(), value.describe_kind())),
            },
            TypeEncoding::Block(sig) => match value {
                ScriptValue::Function(function) => {
                    Ok(NativeValue::Block(Some(self.native_block(function.clone(), sig))))
                }
                v if v.is_nullish() => Ok(NativeValue::Block(None)),
                _ => Err(BridgeError::mismatch(expected(), value.describe_kind())),
            },
            TypeEncoding::Struct(id) => match value {
                ScriptValue::Record(fields) => self.native_struct(*id, fields, &expected()),
                _ => Err(BridgeError::mismatch(expected(), value.describe_kind())),
            },
            TypeEncoding::Pointer => match value {
                v if v.is_nullish() => Ok(NativeValue::Pointer(0)),
                _ => integer(value, "pointer").map(NativeValue::Pointer),
            },
        }
    }

    /// Every field converts, or none does
    fn native_struct(
        &self,
        id: DescriptorId,
        fields: &BTreeMap<String, ScriptValue>,
        expected: &str,
    ) -> Result<NativeValue, BridgeError> {
        let Some(Descriptor::Struct(layout)) = self.bridge.meta().descriptor(id) else {
            return Err(BridgeError::not_found("metadata", expected));
        };

        let layout = layout.fields();
        let mut values = Vec::with_capacity(layout.len());
        for field in &layout {
            let value = fields.get(field.name).ok_or_else(|| {
                BridgeError::conversion(expected, "object", format!("missing field '{}'", field.name))
            })?;
            values.push(self.native(value, &field.ty)?);
        }
        Ok(NativeValue::Struct(values))
    }

    fn scripting(&self, value: NativeValue, ty: &TypeEncoding, owning: bool) -> Result<ScriptValue, BridgeError> {
        if *ty != TypeEncoding::Void && value.kind() != ty.native_kind() {
            return Err(BridgeError::mismatch(self.type_name(ty), value.kind().c_name()));
        }

        Ok(match value {
            NativeValue::Void => ScriptValue::Undefined,
            NativeValue::Bool(b) => ScriptValue::Bool(b),
            NativeValue::I8(v) => ScriptValue::Number(v.into()),
            NativeValue::I16(v) => ScriptValue::Number(v.into()),
            NativeValue::I32(v) => ScriptValue::Number(v.into()),
            NativeValue::U8(v) => ScriptValue::Number(v.into()),
            NativeValue::U16(v) => ScriptValue::Number(v.into()),
            NativeValue::U32(v) => ScriptValue::Number(v.into()),
            NativeValue::I64(v) if v.unsigned_abs() <= MAX_SAFE_INTEGER => ScriptValue::Number(v as f64),
            NativeValue::I64(v) => ScriptValue::BigInt(v.into()),
            NativeValue::U64(v) if v <= MAX_SAFE_INTEGER => ScriptValue::Number(v as f64),
            NativeValue::U64(v) => ScriptValue::BigInt(v.into()),
            NativeValue::F32(v) => ScriptValue::Number(v.into()),
            NativeValue::F64(v) => ScriptValue::Number(v),
            NativeValue::CString(None) => ScriptValue::Null,
            NativeValue::CString(Some(s)) => match s.into_string() {
                Ok(text) => ScriptValue::String(text),
                Err(_) => {
                    return Err(BridgeError::conversion("string", "C string", "not valid UTF-8"));
                }
            },
            NativeValue::Object(ptr) if ptr.is_null() => ScriptValue::Null,
            NativeValue::Object(ptr) => {
                let declared = match ty {
                    TypeEncoding::Object(declared) => *declared,
                    _ => None,
                };
                self.wrap(ptr, declared, owning)?
            }
            NativeValue::Class(None) => ScriptValue::Null,
            NativeValue::Class(Some(class)) => {
                let runtime = self.bridge.runtime();
                let name = runtime.class_name(class).unwrap_or_default();
                ScriptValue::Constructor(self.bridge.synthesizer().synthesize_named(&name)?)
            }
            NativeValue::Block(None) => ScriptValue::Null,
            NativeValue::Block(Some(block)) => match ty {
                TypeEncoding::Block(sig) => ScriptValue::Function(self.script_function(block, sig)),
                _ => return Err(BridgeError::mismatch(self.type_name(ty), "block")),
            },
            NativeValue::Struct(values) => match ty {
                TypeEncoding::Struct(id) => self.scripting_struct(*id, values, ty)?,
                _ => return Err(BridgeError::mismatch(self.type_name(ty), "struct")),
            },
            NativeValue::Pointer(0) => ScriptValue::Null,
            NativeValue::Pointer(addr) => ScriptValue::Number(addr as f64),
        })
    }

    fn scripting_struct(
        &self,
        id: DescriptorId,
        values: Vec<NativeValue>,
        ty: &TypeEncoding,
    ) -> Result<ScriptValue, BridgeError> {
        let expected = self.type_name(ty);
        let Some(Descriptor::Struct(layout)) = self.bridge.meta().descriptor(id) else {
            return Err(BridgeError::not_found("metadata", expected));
        };

        let layout = layout.fields();
        if layout.len() != values.len() {
            return Err(BridgeError::conversion(
                expected,
                format!("struct of {} field(s)", values.len()),
                format!("expected {} field(s)", layout.len()),
            ));
        }

        let mut record = BTreeMap::new();
        for (field, value) in layout.iter().zip(values) {
            record.insert(field.name.to_string(), self.scripting(value, &field.ty, false)?);
        }
        Ok(ScriptValue::Record(record))
    }

    /// Wrapper for a native instance, reusing the registered one
    fn wrap(&self, ptr: ObjectPtr, declared: Option<DescriptorId>, owning: bool) -> Result<ScriptValue, BridgeError> {
        let registry = self.bridge.registry();
        let class = match registry.lookup(ptr) {
            Some(existing) if !owning => return Ok(ScriptValue::Object(existing)),
            Some(existing) => Arc::clone(existing.class()),
            None => {
                if !self.bridge.runtime().is_live(ptr) {
                    return Err(BridgeError::conversion(
                        "object",
                        format!("instance {}", ptr),
                        "dangling instance pointer",
                    ));
                }
                self.bridge.synthesizer().class_for_instance(ptr, declared)?
            }
        };
        Ok(ScriptValue::Object(registry.wrapper_for(ptr, &class, owning)))
    }

    /// Native block that calls back into scripting code
    fn native_block(&self, function: ScriptFunction, sig: &Signature) -> NativeBlock {
        let bridge = self.bridge.downgrade();
        let sig = sig.clone();
        NativeBlock::new(sig.arity(), move |args| {
            let zero = || NativeValue::zero(sig.ret.native_kind());
            let Some(bridge) = bridge.upgrade() else {
                warn!(event = "callback_after_shutdown", "block invoked after the bridge was dropped");
                return zero();
            };
            match bridge.converter().invoke_script(&function, &sig, args) {
                Ok(value) => value,
                Err(err) => {
                    warn!(
                        event = "callback_failed",
                        function = function.name().unwrap_or("anonymous"),
                        error = %err,
                        "scripting callback failed"
                    );
                    zero()
                }
            }
        })
    }

    fn invoke_script(
        &self,
        function: &ScriptFunction,
        sig: &Signature,
        args: &[NativeValue],
    ) -> Result<NativeValue, BridgeError> {
        let member = function.name().unwrap_or("block");
        let mut script_args = Vec::with_capacity(args.len());
        for (i, (arg, ty)) in args.iter().zip(&sig.params).enumerate() {
            script_args.push(self.to_scripting(arg.clone(), ty).map_err(|err| err.at(member, Some(i)))?);
        }
        let result = function.call(&script_args)?;
        self.to_native(&result, &sig.ret).map_err(|err| err.at(member, None))
    }

    /// Scripting function that invokes a native block
    fn script_function(&self, block: NativeBlock, sig: &Signature) -> ScriptFunction {
        let bridge = self.bridge.downgrade();
        let sig = sig.clone();
        let arity = sig.arity();
        ScriptFunction::new(move |args| {
            let bridge = bridge
                .upgrade()
                .ok_or_else(|| BridgeError::not_found("bridge", "block"))?;
            let converter = bridge.converter();
            let frame = converter.frame("block", &sig.params, args)?;
            let result = block.invoke(&frame)?;
            converter.to_scripting(result, &sig.ret).map_err(|err| err.at("block", None))
        })
        .named("block")
        .with_arity(arity)
    }
}

fn integer<T: FromPrimitive>(value: &ScriptValue, expected: &str) -> Result<T, BridgeError> {
    let out_of_range = || BridgeError::conversion(expected, value.describe_kind(), "out of range");
    match *value {
        ScriptValue::Number(n) => {
            if !n.is_finite() || n.fract() != 0.0 {
                return Err(BridgeError::conversion(
                    expected,
                    value.describe_kind(),
                    "not an integer",
                ));
            }
            T::from_f64(n).ok_or_else(out_of_range)
        }
        ScriptValue::BigInt(n) => T::from_i128(n).ok_or_else(out_of_range),
        _ => Err(BridgeError::mismatch(expected, value.describe_kind())),
    }
}

fn float(value: &ScriptValue, expected: &str) -> Result<f64, BridgeError> {
    match *value {
        ScriptValue::Number(n) => Ok(n),
        ScriptValue::BigInt(n) => Ok(n as f64),
        _ => Err(BridgeError::mismatch(expected, value.describe_kind())),
    }
}
