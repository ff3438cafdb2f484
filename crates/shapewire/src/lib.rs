//! Shape-driven binary and JSON codec with versionable wire formats.
//!
//! shapewire serializes arbitrary object graphs — records, collections,
//! dictionaries, enums, polymorphic record fields — through an explicit,
//! data-driven type model: each type declares its members once via
//! [`Shaped::describe`], and the compiled [`Shape`] drives two wire
//! protocols sharing one semantic model.
//!
//! Both protocols tolerate added, removed, and reordered fields, preserve
//! unknown future types and fields for faithful round-trips, and support
//! surrogate representations and merge-into-existing reads.
//!
//! # Example
//!
//! ```
//! use shapewire::{record_value, BinaryDeserializer, BinarySerializer, Shaped, ShapeBuilder};
//!
//! #[derive(Debug, Clone, Default, PartialEq)]
//! struct Point {
//!     x: i32,
//!     y: i32,
//! }
//!
//! impl Shaped for Point {
//!     fn class_name() -> &'static str {
//!         "Point"
//!     }
//!     fn describe(b: &mut ShapeBuilder<Self>) {
//!         b.compact();
//!         b.required("X", |p: &Point| &p.x, |p: &mut Point| &mut p.x);
//!         b.required("Y", |p: &Point| &p.y, |p: &mut Point| &mut p.y);
//!     }
//! }
//! record_value!(Point);
//!
//! shapewire::registry::register::<Point>().unwrap();
//! let mut ser = BinarySerializer::new();
//! let bytes = ser.to_bytes(&Point { x: 33, y: 44 }).unwrap();
//! let mut de = BinaryDeserializer::new();
//! assert_eq!(de.from_bytes::<Point>(&bytes).unwrap(), Point { x: 33, y: 44 });
//! ```

pub mod binary;
mod decimal;
mod error;
pub mod json;
mod meta;
mod options;
mod rough;
mod time;
mod unknown;
pub mod value;

pub use binary::{
    specialized_target, BinaryDeserializeOptions, BinaryDeserializer, BinarySerializeOptions,
    BinarySerializer, ClassDef, SpecializedReadFn, SpecializedReaders,
};
pub use decimal::Decimal;
pub use error::Error;
pub use json::{register_key_parser, JsonDeserializer, JsonOptions, JsonSerializer};
pub use meta::registry;
pub use meta::{
    EnumDef, FieldType, ItemKind, Member, MemberCfg, Record, Shape, ShapeBuilder, Shaped,
};
pub use options::{CommonOptions, TagMode};
pub use rough::{RoughType, WireType};
pub use time::{DateTime, TimeSpan};
pub use unknown::{UnknownItem, UnknownRecord, UnknownStorage};
pub use value::{FieldValue, Value};

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use shapewire_buffers::{Reader, Writer};

    use super::binary::SIGNATURE;
    use super::*;

    // ---------------------------------------------------------------- samples

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Sample1 {
        x: i32,
        y: String,
    }

    impl Shaped for Sample1 {
        fn class_name() -> &'static str {
            "Sample1"
        }
        fn describe(b: &mut ShapeBuilder<Self>) {
            b.required("X", |o: &Sample1| &o.x, |o: &mut Sample1| &mut o.x);
            b.member("Y", |o: &Sample1| &o.y, |o: &mut Sample1| &mut o.y);
        }
    }
    record_value!(Sample1);

    #[derive(Debug, Clone, Default, PartialEq)]
    struct SamplePoint {
        x: i32,
        y: i32,
    }

    impl Shaped for SamplePoint {
        fn class_name() -> &'static str {
            "SamplePoint"
        }
        fn describe(b: &mut ShapeBuilder<Self>) {
            b.compact();
            b.required("X", |o: &SamplePoint| &o.x, |o: &mut SamplePoint| &mut o.x);
            b.required("Y", |o: &SamplePoint| &o.y, |o: &mut SamplePoint| &mut o.y);
        }
    }
    record_value!(SamplePoint);

    #[derive(Debug, Clone, Default, PartialEq)]
    struct SampleRect {
        a: SamplePoint,
        b: SamplePoint,
    }

    impl Shaped for SampleRect {
        fn class_name() -> &'static str {
            "SampleRect"
        }
        fn describe(b: &mut ShapeBuilder<Self>) {
            b.required("A", |o: &SampleRect| &o.a, |o: &mut SampleRect| &mut o.a);
            b.required("B", |o: &SampleRect| &o.b, |o: &mut SampleRect| &mut o.b);
        }
    }
    record_value!(SampleRect);

    #[derive(Debug, Clone, Default, PartialEq)]
    struct SampleMerge {
        di: HashMap<i32, i32>,
        li: Vec<i32>,
        m: Sample1,
    }

    impl Shaped for SampleMerge {
        fn class_name() -> &'static str {
            "SampleMerge"
        }
        fn describe(b: &mut ShapeBuilder<Self>) {
            b.required("DI", |o: &SampleMerge| &o.di, |o: &mut SampleMerge| &mut o.di)
                .merge();
            b.required("LI", |o: &SampleMerge| &o.li, |o: &mut SampleMerge| &mut o.li)
                .merge();
            b.optional("M", |o: &SampleMerge| &o.m, |o: &mut SampleMerge| &mut o.m)
                .merge();
        }
    }
    record_value!(SampleMerge);

    #[derive(Debug, Clone, Copy, Default, PartialEq)]
    enum SampleEnum {
        #[default]
        E1 = 0,
        E2 = 1,
        E3 = 2,
    }
    enum_value!(SampleEnum { E1 = 0, E2 = 1, E3 = 2 });

    #[derive(Debug, Clone, Default, PartialEq)]
    struct SampleWithEnum {
        e: SampleEnum,
    }

    impl Shaped for SampleWithEnum {
        fn class_name() -> &'static str {
            "SampleWithEnum"
        }
        fn describe(b: &mut ShapeBuilder<Self>) {
            b.required("E", |o: &SampleWithEnum| &o.e, |o: &mut SampleWithEnum| {
                &mut o.e
            });
        }
    }
    record_value!(SampleWithEnum);

    #[derive(Debug, Clone, Default, PartialEq)]
    struct SampleEvo {
        a: i32,
        b: Option<String>,
    }

    impl Shaped for SampleEvo {
        fn class_name() -> &'static str {
            "SampleEvo"
        }
        fn describe(b: &mut ShapeBuilder<Self>) {
            b.required("A", |o: &SampleEvo| &o.a, |o: &mut SampleEvo| &mut o.a);
            b.optional("B", |o: &SampleEvo| &o.b, |o: &mut SampleEvo| &mut o.b);
        }
    }
    record_value!(SampleEvo);

    #[derive(Debug, Clone, Default, PartialEq)]
    struct SampleStored {
        a: i32,
        rest: UnknownStorage,
    }

    impl Shaped for SampleStored {
        fn class_name() -> &'static str {
            "SampleStored"
        }
        fn describe(b: &mut ShapeBuilder<Self>) {
            b.required("A", |o: &SampleStored| &o.a, |o: &mut SampleStored| &mut o.a);
            b.unknown_storage(|o| &o.rest, |o| &mut o.rest);
        }
    }
    record_value!(SampleStored);

    #[derive(Debug, Clone, Default, PartialEq)]
    struct SampleSize {
        w: i32,
        h: i32,
    }

    impl Shaped for SampleSize {
        fn class_name() -> &'static str {
            "SampleSize"
        }
        fn describe(b: &mut ShapeBuilder<Self>) {
            b.surrogate::<SamplePoint>(
                |o| SamplePoint { x: o.w, y: o.h },
                |p| SampleSize { w: p.x, h: p.y },
            );
        }
    }
    record_value!(SampleSize);

    #[derive(Debug, Clone, Default)]
    struct SampleHolder {
        name: String,
        body: Option<Box<dyn Record>>,
    }

    impl Shaped for SampleHolder {
        fn class_name() -> &'static str {
            "SampleHolder"
        }
        fn describe(b: &mut ShapeBuilder<Self>) {
            b.required("Name", |o: &SampleHolder| &o.name, |o: &mut SampleHolder| {
                &mut o.name
            });
            b.optional("Body", |o: &SampleHolder| &o.body, |o: &mut SampleHolder| {
                &mut o.body
            });
        }
    }
    record_value!(SampleHolder);

    fn register_samples() {
        registry::register::<Sample1>().unwrap();
        registry::register::<SamplePoint>().unwrap();
        registry::register::<SampleRect>().unwrap();
        registry::register::<SampleMerge>().unwrap();
        registry::register::<SampleWithEnum>().unwrap();
        registry::register::<SampleEvo>().unwrap();
        registry::register::<SampleStored>().unwrap();
        registry::register::<SampleSize>().unwrap();
        registry::register::<SampleHolder>().unwrap();
    }

    fn bin_roundtrip<V: FieldValue + PartialEq + std::fmt::Debug + Clone>(v: &V) -> V {
        let mut ser = BinarySerializer::new();
        let bytes = ser.to_bytes(v).unwrap();
        let mut de = BinaryDeserializer::new();
        de.from_bytes::<V>(&bytes).unwrap()
    }

    fn json_roundtrip<V: FieldValue + PartialEq + std::fmt::Debug + Clone>(v: &V) -> V {
        let mut ser = JsonSerializer::new();
        let text = ser.to_string(v).unwrap();
        let mut de = JsonDeserializer::new();
        de.from_str::<V>(&text).unwrap()
    }

    // --------------------------------------------------------------- binary

    #[test]
    fn binary_simple_record_layout() {
        register_samples();
        let v = Sample1 {
            x: 345,
            y: "test".into(),
        };
        let mut ser = BinarySerializer::new();
        let bytes = ser.to_bytes(&v).unwrap();

        let mut expected = Writer::new();
        expected.u8(RoughType::Record as u8);
        expected.u16(1);
        expected.lp_str(Some("Sample1"));
        expected.u16(2);
        expected.lp_str(Some("X"));
        expected.u8(RoughType::Int as u8);
        expected.lp_str(Some("Y"));
        expected.u8(RoughType::String as u8);
        expected.u16(1);
        expected.i32(345);
        expected.u16(2);
        expected.lp_str(Some("test"));
        expected.u16(0);
        assert_eq!(bytes, expected.flush());

        let mut de = BinaryDeserializer::new();
        assert_eq!(de.from_bytes::<Sample1>(&bytes).unwrap(), v);
    }

    #[test]
    fn binary_member_default_is_skipped() {
        register_samples();
        let v = Sample1 {
            x: 7,
            y: String::new(),
        };
        let mut ser = BinarySerializer::new();
        let bytes = ser.to_bytes(&v).unwrap();
        // Only the X field index appears before the terminator.
        let mut expected_tail = Writer::new();
        expected_tail.u16(1);
        expected_tail.i32(7);
        expected_tail.u16(0);
        assert!(bytes.ends_with(expected_tail.as_slice()));
        assert_eq!(bin_roundtrip(&v), v);
    }

    #[test]
    fn binary_compact_point_is_two_raw_ints() {
        register_samples();
        let v = SamplePoint { x: 33, y: 44 };
        let mut ser = BinarySerializer::new();
        let bytes = ser.to_bytes(&v).unwrap();

        let mut expected = Writer::new();
        expected.u8(RoughType::Record as u8);
        expected.u16(1);
        expected.lp_str(Some("SamplePoint"));
        expected.u16(2);
        expected.lp_str(Some("X"));
        expected.u8(RoughType::Int as u8);
        expected.lp_str(Some("Y"));
        expected.u8(RoughType::Int as u8);
        expected.i32(33);
        expected.i32(44);
        assert_eq!(bytes, expected.flush());
        assert_eq!(bin_roundtrip(&v), v);
    }

    #[test]
    fn binary_class_id_cached_within_stream() {
        register_samples();
        let v = SampleRect {
            a: SamplePoint { x: 33, y: 44 },
            b: SamplePoint { x: 55, y: 66 },
        };
        let mut ser = BinarySerializer::new();
        let bytes = ser.to_bytes(&v).unwrap();
        let name_hits = bytes
            .windows(b"SamplePoint".len())
            .filter(|w| *w == b"SamplePoint")
            .count();
        assert_eq!(name_hits, 1, "field table must be emitted only once");
        assert_eq!(bin_roundtrip(&v), v);

        // A fresh stream on the same serializer keeps ids unless cleared.
        let again = ser.to_bytes(&v).unwrap();
        assert!(again.len() < bytes.len());
        ser.clear_class_ids();
        assert_eq!(ser.to_bytes(&v).unwrap(), bytes);
    }

    #[test]
    fn binary_collections_dictionaries_nullable_roundtrip() {
        register_samples();
        let list = vec![1i32, -2, 3];
        assert_eq!(bin_roundtrip(&list), list);

        let mut map = HashMap::new();
        map.insert(5i32, "five".to_string());
        assert_eq!(bin_roundtrip(&map), map);

        let maybe: Option<i32> = Some(9);
        assert_eq!(bin_roundtrip(&maybe), maybe);
        let nothing: Option<i32> = None;
        assert_eq!(bin_roundtrip(&nothing), nothing);

        let opt_list: Option<Vec<i32>> = None;
        assert_eq!(bin_roundtrip(&opt_list), opt_list);

        let points = vec![
            SamplePoint { x: 1, y: 2 },
            SamplePoint { x: 3, y: 4 },
        ];
        assert_eq!(bin_roundtrip(&points), points);

        let e = SampleWithEnum { e: SampleEnum::E3 };
        assert_eq!(bin_roundtrip(&e), e);

        let d: Decimal = "-123.456".parse().unwrap();
        assert_eq!(bin_roundtrip(&d), d);

        let ts = TimeSpan::from_hms(1, 2, 3);
        assert_eq!(bin_roundtrip(&ts), ts);

        let dt: DateTime = time_sample();
        assert_eq!(bin_roundtrip(&dt), dt);
    }

    fn time_sample() -> DateTime {
        chrono::NaiveDate::from_ymd_opt(2024, 8, 5)
            .unwrap()
            .and_hms_nano_opt(16, 23, 1, 123_456_700)
            .unwrap()
    }

    #[test]
    fn binary_merge_combines_containers_and_records() {
        register_samples();
        let mut v1 = SampleMerge::default();
        v1.di.insert(3, 4);
        v1.li.push(33);
        v1.m = Sample1 {
            x: 768,
            y: String::new(),
        };
        let mut ser = BinarySerializer::new();
        let bytes = ser.to_bytes(&v1).unwrap();

        let mut w1 = SampleMerge::default();
        w1.di.insert(5, 6);
        w1.li.push(44);
        w1.m = Sample1 {
            x: 999,
            y: "qqq".into(),
        };
        let mut de = BinaryDeserializer::new();
        de.from_bytes_into(&mut w1, &bytes).unwrap();

        let expected_di: HashMap<i32, i32> = [(5, 6), (3, 4)].into_iter().collect();
        assert_eq!(w1.di, expected_di);
        assert_eq!(w1.li, vec![44, 33]);
        assert_eq!(w1.m.x, 768);
        assert_eq!(w1.m.y, "qqq", "absent member must keep the existing value");
    }

    #[test]
    fn binary_forward_compat_missing_optional_defaults() {
        register_samples();
        // A producer one schema version behind omits the optional B.
        let mut w = Writer::new();
        w.u8(RoughType::Record as u8);
        w.u16(1);
        w.lp_str(Some("SampleEvo"));
        w.u16(1);
        w.lp_str(Some("A"));
        w.u8(RoughType::Int as u8);
        w.u16(1);
        w.i32(7);
        w.u16(0);
        let mut de = BinaryDeserializer::new();
        let v = de.from_bytes::<SampleEvo>(&w.flush()).unwrap();
        assert_eq!(v, SampleEvo { a: 7, b: None });
    }

    #[test]
    fn binary_backward_compat_extra_field_tolerated() {
        register_samples();
        // A producer one schema version ahead appends an unknown C.
        let mut w = Writer::new();
        w.u8(RoughType::Record as u8);
        w.u16(1);
        w.lp_str(Some("SampleEvo"));
        w.u16(3);
        w.lp_str(Some("A"));
        w.u8(RoughType::Int as u8);
        w.lp_str(Some("B"));
        w.u8(RoughType::String as u8);
        w.lp_str(Some("C"));
        w.u8(RoughType::Int as u8);
        w.u16(1);
        w.i32(7);
        w.u16(3);
        w.i32(100);
        w.u16(0);
        let bytes = w.flush();

        let mut strict = BinaryDeserializer::new();
        assert!(matches!(
            strict.from_bytes::<SampleEvo>(&bytes),
            Err(Error::UnknownField { .. })
        ));

        let mut tolerant = BinaryDeserializer::new();
        tolerant.options.allow_unknown_fields = true;
        let v = tolerant.from_bytes::<SampleEvo>(&bytes).unwrap();
        assert_eq!(v, SampleEvo { a: 7, b: None });
    }

    #[test]
    fn binary_missing_required_field_is_an_error() {
        register_samples();
        let mut w = Writer::new();
        w.u8(RoughType::Record as u8);
        w.u16(1);
        w.lp_str(Some("Sample1"));
        w.u16(1);
        w.lp_str(Some("Y"));
        w.u8(RoughType::String as u8);
        w.u16(1);
        w.lp_str(Some("test"));
        w.u16(0);
        let mut de = BinaryDeserializer::new();
        match de.from_bytes::<Sample1>(&w.flush()) {
            Err(Error::MissingRequiredField { field, class }) => {
                assert_eq!(field, "X");
                assert_eq!(class, "Sample1");
            }
            other => panic!("expected missing-required error, got {other:?}"),
        }
    }

    #[test]
    fn binary_field_indexes_must_increase() {
        register_samples();
        let mut w = Writer::new();
        w.u8(RoughType::Record as u8);
        w.u16(1);
        w.lp_str(Some("SampleEvo"));
        w.u16(2);
        w.lp_str(Some("A"));
        w.u8(RoughType::Int as u8);
        w.lp_str(Some("B"));
        w.u8(RoughType::String as u8);
        w.u16(1);
        w.i32(7);
        w.u16(1);
        w.i32(8);
        w.u16(0);
        let mut de = BinaryDeserializer::new();
        assert!(matches!(
            de.from_bytes::<SampleEvo>(&w.flush()),
            Err(Error::MalformedStream { .. })
        ));
    }

    #[test]
    fn binary_truncated_buffer_is_malformed_not_panic() {
        register_samples();
        let mut ser = BinarySerializer::new();
        let bytes = ser.to_bytes(&Sample1 { x: 1, y: "abc".into() }).unwrap();
        let mut de = BinaryDeserializer::new();
        assert!(matches!(
            de.from_bytes::<Sample1>(&bytes[..bytes.len() - 3]),
            Err(Error::MalformedStream { .. })
        ));
    }

    #[test]
    fn binary_unknown_class_roundtrips_bit_identically() {
        register_samples();
        let mut w = Writer::new();
        w.u8(RoughType::Record as u8);
        w.u16(1);
        w.lp_str(Some("Mystery"));
        w.u16(2);
        w.lp_str(Some("A"));
        w.u8(RoughType::Int as u8);
        w.lp_str(Some("B"));
        w.u8(RoughType::String as u8);
        w.u16(1);
        w.i32(10);
        w.u16(2);
        w.lp_str(Some("zz"));
        w.u16(0);
        let bytes = w.flush();

        let mut de = BinaryDeserializer::new();
        let rec: Box<dyn Record> = de.from_bytes(&bytes).unwrap();
        let u = rec.as_any().downcast_ref::<UnknownRecord>().unwrap();
        assert_eq!(u.class_tag, "Mystery");
        assert_eq!(u.fields.len(), 2);
        assert_eq!(u.fields[0].value, Value::Int(10));

        let mut ser = BinarySerializer::new();
        let again = ser.to_bytes(&rec).unwrap();
        assert_eq!(again, bytes);
    }

    #[test]
    fn binary_unknown_storage_reproduces_fields() {
        register_samples();
        let mut w = Writer::new();
        w.u8(RoughType::Record as u8);
        w.u16(1);
        w.lp_str(Some("SampleStored"));
        w.u16(2);
        w.lp_str(Some("A"));
        w.u8(RoughType::Int as u8);
        w.lp_str(Some("B"));
        w.u8(RoughType::Int as u8);
        w.u16(1);
        w.i32(1);
        w.u16(2);
        w.i32(10);
        w.u16(0);
        let bytes = w.flush();

        let mut de = BinaryDeserializer::new();
        let v: SampleStored = de.from_bytes(&bytes).unwrap();
        assert_eq!(v.a, 1);
        assert_eq!(v.rest.len(), 1);
        assert_eq!(v.rest.fields()[0].name, "B");

        let mut ser = BinarySerializer::new();
        assert_eq!(ser.to_bytes(&v).unwrap(), bytes);
    }

    #[test]
    fn binary_surrogate_writes_point_shape() {
        register_samples();
        let v = SampleSize { w: 10, h: 20 };
        let mut ser = BinarySerializer::new();
        let bytes = ser.to_bytes(&v).unwrap();
        // The wire carries the surrogate's compact class, not SampleSize.
        assert!(bytes
            .windows(b"SamplePoint".len())
            .any(|w| w == b"SamplePoint"));
        assert!(!bytes.windows(b"SampleSize".len()).any(|w| w == b"SampleSize"));
        let mut de = BinaryDeserializer::new();
        assert_eq!(de.from_bytes::<SampleSize>(&bytes).unwrap(), v);
    }

    #[test]
    fn binary_polymorphic_field_roundtrip() {
        register_samples();
        let v = SampleHolder {
            name: "holder".into(),
            body: Some(Box::new(Sample1 {
                x: 5,
                y: "body".into(),
            })),
        };
        let mut ser = BinarySerializer::new();
        let bytes = ser.to_bytes(&v).unwrap();
        let mut de = BinaryDeserializer::new();
        let w: SampleHolder = de.from_bytes(&bytes).unwrap();
        assert_eq!(w.name, "holder");
        let body = w.body.unwrap();
        let inner = body.as_any().downcast_ref::<Sample1>().unwrap();
        assert_eq!(inner.x, 5);
        assert_eq!(inner.y, "body");
    }

    #[test]
    fn binary_signature_is_checked() {
        register_samples();
        let mut ser = BinarySerializer::new();
        ser.binary_options.auto_signature = true;
        let bytes = ser.to_bytes(&SamplePoint { x: 1, y: 2 }).unwrap();
        assert_eq!(&bytes[..4], &SIGNATURE);

        let mut de = BinaryDeserializer::new();
        de.binary_options.auto_signature = true;
        assert_eq!(
            de.from_bytes::<SamplePoint>(&bytes).unwrap(),
            SamplePoint { x: 1, y: 2 }
        );
        let mut corrupted = bytes.clone();
        corrupted[0] = 0xFF;
        de.clear_class_ids();
        assert!(matches!(
            de.from_bytes::<SamplePoint>(&corrupted),
            Err(Error::MalformedStream { .. })
        ));
    }

    #[test]
    fn binary_specialized_reader_matches_generic() {
        register_samples();

        fn read_sample1(
            _d: &mut BinaryDeserializer,
            r: &mut Reader<'_>,
            _def: &ClassDef,
            obj: &mut dyn Record,
        ) -> Result<(), Error> {
            let obj = specialized_target::<Sample1>(obj)?;
            let mut idx = r.u16()?;
            if idx == 1 {
                obj.x = r.i32()?;
                idx = r.u16()?;
            }
            if idx == 2 {
                obj.y = r.lp_str()?.unwrap_or_default();
                idx = r.u16()?;
            }
            if idx != 0 {
                return Err(Error::stream(format!(
                    "unfinished object, expected zero but got {idx}"
                )));
            }
            Ok(())
        }

        let v = Sample1 {
            x: 345,
            y: "fast".into(),
        };
        let mut ser = BinarySerializer::new();
        let bytes = ser.to_bytes(&v).unwrap();

        let mut generic = BinaryDeserializer::new();
        let mut readers = SpecializedReaders::new();
        readers.register::<Sample1>(read_sample1);
        let mut fast = BinaryDeserializer::with_specialized(readers);

        let a: Sample1 = generic.from_bytes(&bytes).unwrap();
        let b: Sample1 = fast.from_bytes(&bytes).unwrap();
        assert_eq!(a, b);
        assert_eq!(b, v);
    }

    #[test]
    fn binary_value_root_and_any_roundtrip() {
        register_samples();
        let mut ser = BinarySerializer::new();
        let bytes = ser.to_bytes(&42i32).unwrap();
        assert_eq!(bytes, vec![RoughType::Int as u8, 42, 0, 0, 0]);
        let mut de = BinaryDeserializer::new();
        assert_eq!(de.from_bytes::<i32>(&bytes).unwrap(), 42);

        // Root type mismatch is rejected before any payload read.
        assert!(matches!(
            de.from_bytes::<String>(&bytes),
            Err(Error::MalformedStream { .. })
        ));

        let v = Value::Seq {
            elem: FieldType::Int,
            items: vec![Value::Int(1), Value::Int(2)],
        };
        let bytes = ser.value_to_bytes(&v).unwrap();
        let back = de.value_from_bytes(&bytes).unwrap();
        assert_eq!(back, v);
    }

    // ----------------------------------------------------------------- json

    #[test]
    fn json_simple_record_layout() {
        register_samples();
        let v = Sample1 {
            x: 345,
            y: "test".into(),
        };
        let mut ser = JsonSerializer::new();
        let text = ser.to_string(&v).unwrap();
        assert_eq!(text, "{\n\t\"X\":345,\n\t\"Y\":\"test\"\n}");
        let mut de = JsonDeserializer::new();
        assert_eq!(de.from_str::<Sample1>(&text).unwrap(), v);
    }

    #[test]
    fn json_output_is_valid_json() {
        register_samples();
        let v = SampleRect {
            a: SamplePoint { x: 1, y: 2 },
            b: SamplePoint { x: 3, y: 4 },
        };
        let mut ser = JsonSerializer::new();
        let text = ser.to_string(&v).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["A"], serde_json::json!([1, 2]));
        assert_eq!(parsed["B"][1], serde_json::json!(4));
    }

    #[test]
    fn json_compact_and_oneline_layouts() {
        register_samples();
        let v = SamplePoint { x: 33, y: 44 };
        let mut ser = JsonSerializer::new();
        assert_eq!(ser.to_string(&v).unwrap(), "[\n\t33,\n\t44\n]");

        ser.json_options.max_oneline_fields = 2;
        assert_eq!(ser.to_string(&v).unwrap(), "[33,44]");

        ser.json_options.ignore_compact = true;
        ser.json_options.max_oneline_fields = 0;
        let text = ser.to_string(&v).unwrap();
        assert_eq!(text, "{\n\t\"X\":33,\n\t\"Y\":44\n}");

        let mut de = JsonDeserializer::new();
        de.json_options.ignore_compact = true;
        assert_eq!(de.from_str::<SamplePoint>(&text).unwrap(), v);
    }

    #[test]
    fn json_roundtrip_matrix() {
        register_samples();
        let rect = SampleRect {
            a: SamplePoint { x: -1, y: 2 },
            b: SamplePoint { x: 0, y: 9 },
        };
        assert_eq!(json_roundtrip(&rect), rect);

        let list = vec!["a".to_string(), "b\"c\\".to_string(), "é\u{1}".to_string()];
        assert_eq!(json_roundtrip(&list), list);

        let mut map = HashMap::new();
        map.insert(7i32, vec![1i64, -2]);
        assert_eq!(json_roundtrip(&map), map);

        let maybe: Option<i32> = None;
        assert_eq!(json_roundtrip(&maybe), maybe);

        let e = SampleWithEnum { e: SampleEnum::E2 };
        assert_eq!(json_roundtrip(&e), e);

        let d: Decimal = "3.14".parse().unwrap();
        assert_eq!(json_roundtrip(&d), d);
        let ts = TimeSpan::from_ticks(15_000_000);
        assert_eq!(json_roundtrip(&ts), ts);
        let dt = time_sample();
        assert_eq!(json_roundtrip(&dt), dt);
    }

    #[test]
    fn json_enum_as_string_mode() {
        register_samples();
        let v = SampleWithEnum { e: SampleEnum::E3 };
        let mut ser = JsonSerializer::new();
        ser.json_options.enum_as_string = true;
        let text = ser.to_string(&v).unwrap();
        assert!(text.contains("\"E3\""));
        let mut de = JsonDeserializer::new();
        de.json_options.enum_as_string = true;
        assert_eq!(de.from_str::<SampleWithEnum>(&text).unwrap(), v);
    }

    #[test]
    fn json_int64_as_string_mode() {
        let mut ser = JsonSerializer::new();
        ser.json_options.int64_as_string = true;
        let text = ser.to_string(&(i64::MIN)).unwrap();
        assert_eq!(text, format!("\"{}\"", i64::MIN));
        let mut de = JsonDeserializer::new();
        de.json_options.int64_as_string = true;
        assert_eq!(de.from_str::<i64>(&text).unwrap(), i64::MIN);
    }

    #[test]
    fn json_missing_required_field_is_an_error() {
        register_samples();
        let mut de = JsonDeserializer::new();
        match de.from_str::<Sample1>("{\"Y\":\"test\"}") {
            Err(Error::MissingRequiredField { field, class }) => {
                assert_eq!(field, "X");
                assert_eq!(class, "Sample1");
            }
            other => panic!("expected missing-required error, got {other:?}"),
        }
        // An empty object misses it too.
        assert!(matches!(
            de.from_str::<Sample1>("{}"),
            Err(Error::MissingRequiredField { .. })
        ));
    }

    #[test]
    fn json_parse_failures_name_the_offending_token() {
        register_samples();
        let mut de = JsonDeserializer::new();
        de.options.report_error_position = true;

        let err = de.from_str::<Sample1>("{\"X\":12x}").unwrap_err();
        assert!(matches!(err, Error::MalformedStream { .. }), "{err}");

        let err = de.from_str::<Vec<i32>>("[1,2").unwrap_err();
        assert!(err.to_string().contains("end of input"), "{err}");

        let err = de.from_str::<Vec<String>>("[\"a\\x\"]").unwrap_err();
        assert!(err.to_string().contains("escape"), "{err}");

        let err = de.from_str::<i32>("5 true").unwrap_err();
        assert!(err.to_string().contains("trailing"), "{err}");
    }

    #[test]
    fn json_overflow_on_narrow_read() {
        let mut de = JsonDeserializer::new();
        assert!(matches!(
            de.from_str::<u8>("256"),
            Err(Error::Overflow { target: "byte" })
        ));
        assert!(matches!(
            de.from_str::<i16>("-40000"),
            Err(Error::Overflow { .. })
        ));
    }

    #[test]
    fn json_unordered_mode_accepts_any_key_order() {
        register_samples();
        let mut de = JsonDeserializer::new();
        let text = "{\"Y\":\"test\",\"X\":345}";
        // Ordered mode rejects the out-of-order required key.
        assert!(de.from_str::<Sample1>(text).is_err());
        de.json_options.unordered = true;
        assert_eq!(
            de.from_str::<Sample1>(text).unwrap(),
            Sample1 {
                x: 345,
                y: "test".into()
            }
        );
    }

    #[test]
    fn json_unknown_storage_reproduces_text() {
        register_samples();
        let text = "{\n\t\"A\":1,\n\t\"B\":10\n}";
        let mut de = JsonDeserializer::new();
        let v: SampleStored = de.from_str(text).unwrap();
        assert_eq!(v.rest.len(), 1);
        let mut ser = JsonSerializer::new();
        assert_eq!(ser.to_string(&v).unwrap(), text);
    }

    #[test]
    fn json_unknown_class_roundtrips_text() {
        register_samples();
        let text = "{\n\t\"class\":\"Mystery\",\n\t\"A\":10\n}";
        let mut de = JsonDeserializer::new();
        let rec: Box<dyn Record> = de.from_str(text).unwrap();
        let u = rec.as_any().downcast_ref::<UnknownRecord>().unwrap();
        assert_eq!(u.class_tag, "Mystery");
        let mut ser = JsonSerializer::new();
        assert_eq!(ser.to_string(&rec).unwrap(), text);
    }

    #[test]
    fn json_surrogate_serializes_as_compact_array() {
        register_samples();
        let v = SampleSize { w: 10, h: 20 };
        let mut ser = JsonSerializer::new();
        ser.json_options.max_oneline_fields = 2;
        let text = ser.to_string(&v).unwrap();
        assert_eq!(text, "[10,20]");
        let mut de = JsonDeserializer::new();
        assert_eq!(de.from_str::<SampleSize>(&text).unwrap(), v);
    }

    #[test]
    fn json_save_root_class_writes_class_tag() {
        register_samples();
        let v = Sample1 {
            x: 1,
            y: "a".into(),
        };
        let mut ser = JsonSerializer::new();
        ser.json_options.save_root_class = true;
        let text = ser.to_string(&v).unwrap();
        assert!(text.contains("\"class\":\"Sample1\""));
        let mut de = JsonDeserializer::new();
        assert_eq!(de.from_str::<Sample1>(&text).unwrap(), v);
    }

    #[test]
    fn json_polymorphic_body_uses_class_tag() {
        register_samples();
        let holder = SampleHolder {
            name: "h".into(),
            body: Some(Box::new(Sample1 {
                x: 5,
                y: "body".into(),
            })),
        };
        let mut ser = JsonSerializer::new();
        let text = ser.to_string(&holder).unwrap();
        assert!(text.contains("\"class\":\"Sample1\""));
        let mut de = JsonDeserializer::new();
        let w: SampleHolder = de.from_str(&text).unwrap();
        assert_eq!(w.name, "h");
        let body = w.body.unwrap();
        let inner = body.as_any().downcast_ref::<Sample1>().unwrap();
        assert_eq!(inner.x, 5);
        assert_eq!(inner.y, "body");
    }

    #[test]
    fn json_merge_combines_containers() {
        register_samples();
        let mut v1 = SampleMerge::default();
        v1.di.insert(3, 4);
        v1.li.push(33);
        v1.m = Sample1 {
            x: 768,
            y: String::new(),
        };
        let mut ser = JsonSerializer::new();
        let text = ser.to_string(&v1).unwrap();

        let mut w1 = SampleMerge::default();
        w1.di.insert(5, 6);
        w1.li.push(44);
        w1.m = Sample1 {
            x: 999,
            y: "qqq".into(),
        };
        let mut de = JsonDeserializer::new();
        de.from_str_into(&mut w1, &text).unwrap();
        let expected_di: HashMap<i32, i32> = [(5, 6), (3, 4)].into_iter().collect();
        assert_eq!(w1.di, expected_di);
        assert_eq!(w1.li, vec![44, 33]);
        assert_eq!(w1.m.x, 768);
        assert_eq!(w1.m.y, "qqq");
    }

    #[test]
    fn json_value_root_reads_any() {
        let mut de = JsonDeserializer::new();
        let v = de.value_from_str("{\"a\":[1,true,null]}").unwrap();
        match v {
            Value::Map { entries, .. } => {
                assert_eq!(entries.len(), 1);
                assert_eq!(entries[0].0, Value::Str("a".into()));
                match &entries[0].1 {
                    Value::Seq { items, .. } => {
                        assert_eq!(items[0], Value::Double(1.0));
                        assert_eq!(items[1], Value::Bool(true));
                        assert_eq!(items[2], Value::Null);
                    }
                    other => panic!("expected sequence, got {other:?}"),
                }
            }
            other => panic!("expected mapping, got {other:?}"),
        }
    }

    // ------------------------------------------------------------ type model

    #[test]
    fn schema_rejects_duplicate_tags() {
        #[derive(Debug, Clone, Default)]
        struct Dup {
            a: i32,
            b: i32,
        }
        impl Shaped for Dup {
            fn class_name() -> &'static str {
                "Dup"
            }
            fn describe(b: &mut ShapeBuilder<Self>) {
                b.required("A", |o: &Dup| &o.a, |o: &mut Dup| &mut o.a);
                b.required("B", |o: &Dup| &o.b, |o: &mut Dup| &mut o.b)
                    .alias("A");
            }
        }
        assert!(matches!(Shape::of::<Dup>(), Err(Error::Schema { .. })));
    }

    #[test]
    fn schema_rejects_empty_types_and_merge_scalars() {
        #[derive(Debug, Clone, Default)]
        struct Empty;
        impl Shaped for Empty {
            fn class_name() -> &'static str {
                "Empty"
            }
            fn describe(_b: &mut ShapeBuilder<Self>) {}
        }
        assert!(matches!(Shape::of::<Empty>(), Err(Error::Schema { .. })));

        #[derive(Debug, Clone, Default)]
        struct MergeScalar {
            a: i32,
        }
        impl Shaped for MergeScalar {
            fn class_name() -> &'static str {
                "MergeScalar"
            }
            fn describe(b: &mut ShapeBuilder<Self>) {
                b.required("A", |o: &MergeScalar| &o.a, |o: &mut MergeScalar| &mut o.a)
                    .merge();
            }
        }
        assert!(matches!(Shape::of::<MergeScalar>(), Err(Error::Schema { .. })));
    }

    #[test]
    fn schema_rejects_surrogate_chains() {
        #[derive(Debug, Clone, Default)]
        struct ChainA {
            v: i32,
        }
        #[derive(Debug, Clone, Default)]
        struct ChainB {
            v: i32,
        }
        #[derive(Debug, Clone, Default)]
        struct ChainC {
            v: i32,
        }
        impl Shaped for ChainC {
            fn class_name() -> &'static str {
                "ChainC"
            }
            fn describe(b: &mut ShapeBuilder<Self>) {
                b.required("V", |o: &ChainC| &o.v, |o: &mut ChainC| &mut o.v);
            }
        }
        record_value!(ChainC);
        impl Shaped for ChainB {
            fn class_name() -> &'static str {
                "ChainB"
            }
            fn describe(b: &mut ShapeBuilder<Self>) {
                b.surrogate::<ChainC>(|o| ChainC { v: o.v }, |c| ChainB { v: c.v });
            }
        }
        record_value!(ChainB);
        impl Shaped for ChainA {
            fn class_name() -> &'static str {
                "ChainA"
            }
            fn describe(b: &mut ShapeBuilder<Self>) {
                b.surrogate::<ChainB>(|o| ChainB { v: o.v }, |b| ChainA { v: b.v });
            }
        }
        record_value!(ChainA);

        let first = Shape::of::<ChainB>();
        let second = Shape::of::<ChainA>();
        assert!(
            first.is_err() || second.is_err(),
            "one hop is fine, the second must be rejected"
        );
    }

    #[test]
    fn tag_modes_change_wire_names() {
        register_samples();
        let shape = Shape::of::<Sample1>().unwrap();
        assert_eq!(shape.members[0].tag(TagMode::Names), "X");
        assert_eq!(shape.members[0].tag(TagMode::Aliases), "X");
        let id = shape.members[0].tag(TagMode::Ids);
        assert_eq!(id.len(), 4);
        assert!(id.bytes().all(|b| b.is_ascii_alphabetic()));

        let v = Sample1 {
            x: 5,
            y: "t".into(),
        };
        let mut ser = JsonSerializer::new();
        ser.options.tag_mode = TagMode::Ids;
        let text = ser.to_string(&v).unwrap();
        assert!(text.contains(&format!("\"{id}\"")));
        let mut de = JsonDeserializer::new();
        de.options.tag_mode = TagMode::Ids;
        assert_eq!(de.from_str::<Sample1>(&text).unwrap(), v);
    }

    #[test]
    fn registry_rejects_name_conflicts() {
        register_samples();
        #[derive(Debug, Clone, Default)]
        struct Sample1Clash {
            a: i32,
        }
        impl Shaped for Sample1Clash {
            fn class_name() -> &'static str {
                "Sample1"
            }
            fn describe(b: &mut ShapeBuilder<Self>) {
                b.required("A", |o: &Sample1Clash| &o.a, |o: &mut Sample1Clash| &mut o.a);
            }
        }
        assert!(matches!(
            registry::register::<Sample1Clash>(),
            Err(Error::Schema { .. })
        ));
    }
}
