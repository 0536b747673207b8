mod common;

use abc2asm_lib::naming::NameCache;
use abc2asm_lib::{EntityId, PandaFile};

use common::builder::*;

/// A source-path record with one method; returns the file and the class and
/// method offsets.
fn index_file() -> (Vec<u8>, u32, u32) {
    let mut b = AbcBuilder::new();
    let name = b.string("render");
    let code = b.code(0, 3, &[0x65], &[]);
    let index = b.class(
        &ClassSpec {
            descriptor: "L&entry/src/main/Index&;",
            source_lang: Some(LANG_ECMASCRIPT),
            methods: vec![MethodSpec {
                name,
                access: ACC_STATIC,
                code: Some(code),
                ..MethodSpec::default()
            }],
            ..ClassSpec::default()
        },
        true,
    );
    (b.finish(), index.class, index.methods[0])
}

#[test]
fn repeated_lookups_return_the_cached_name() {
    let (bytes, class, method) = index_file();
    let file = PandaFile::parse(&bytes).unwrap();
    let mut names = NameCache::new(None);

    let record = names.record_name(&file, EntityId(class)).unwrap();
    assert_eq!(record, "&entry/src/main/Index&");
    assert_eq!(names.record_name(&file, EntityId(class)).unwrap(), record);

    let function = names.function_name(&file, EntityId(method)).unwrap();
    assert_eq!(function, "&entry/src/main/Index&.render");
    assert_eq!(names.function_name(&file, EntityId(method)).unwrap(), function);
}

#[test]
fn bundle_prefix_is_applied_once() {
    let (bytes, class, method) = index_file();
    let file = PandaFile::parse(&bytes).unwrap();
    let mut names = NameCache::new(Some("com.example.app".into()));

    let expected = "com.example.app&entry/src/main/Index&";
    assert_eq!(names.record_name(&file, EntityId(class)).unwrap(), expected);
    assert_eq!(names.record_name(&file, EntityId(class)).unwrap(), expected);
    // the function lookup goes through the cached record name
    assert_eq!(
        names.function_name(&file, EntityId(method)).unwrap(),
        format!("{expected}.render")
    );
}

#[test]
fn empty_bundle_name_adds_no_prefix() {
    let (bytes, class, _) = index_file();
    let file = PandaFile::parse(&bytes).unwrap();
    let mut names = NameCache::new(Some(String::new()));
    assert_eq!(names.record_name(&file, EntityId(class)).unwrap(), "&entry/src/main/Index&");
}
