//! 解析引擎的集成测试

use dirigent::{
    Container, ContainerError, LocatorRef, Params, RawDefinition, ServiceLocator,
    ServiceLocatorExt, TypeCatalog, LOCATOR_ID,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// 测试用的服务
#[derive(Debug, Default)]
struct Logger {
    level: String,
}

/// 依赖另一个服务的服务
struct Wrapper {
    inner: dirigent::Instance,
}

struct LocatorHolder {
    locator: LocatorRef,
}

fn depends_on(target: &'static str) -> RawDefinition {
    RawDefinition::factory(move |locator: &dyn ServiceLocator, _: &Params| {
        Ok(Wrapper {
            inner: locator.get(target)?,
        })
    })
}

#[test]
fn test_consecutive_gets_return_identical_object() {
    let container = Container::new();
    container
        .set(
            "logger",
            RawDefinition::factory(|_, _| {
                Ok(Logger {
                    level: "info".to_string(),
                })
            }),
        )
        .unwrap();

    let first = container.get("logger").unwrap();
    let second = container.get("logger").unwrap();
    assert!(first.ptr_eq(&second));
    assert_eq!(first.downcast::<Logger>().unwrap().level, "info");
}

#[test]
fn test_set_invalidates_cached_instance() {
    let container = Container::new();
    let builds = Arc::new(AtomicUsize::new(0));
    let define = |builds: Arc<AtomicUsize>| {
        RawDefinition::factory(move |_, _| {
            builds.fetch_add(1, Ordering::SeqCst);
            Ok(Logger::default())
        })
    };

    container.set("logger", define(builds.clone())).unwrap();
    let before = container.get("logger").unwrap();
    container.set("logger", define(builds.clone())).unwrap();
    let after = container.get("logger").unwrap();

    assert!(!before.ptr_eq(&after));
    assert_eq!(builds.load(Ordering::SeqCst), 2);
}

#[test]
fn test_circular_reference_names_whole_chain() {
    let container = Container::new();
    container.set("A", depends_on("B")).unwrap();
    container.set("B", depends_on("A")).unwrap();

    let err = container.get("A").unwrap_err();
    match &err {
        ContainerError::CircularReference { id, chain } => {
            assert_eq!(id, "A");
            assert_eq!(chain, &vec!["A", "B", "A"]);
        }
        other => panic!("expected circular reference, got {:?}", other),
    }
    assert!(err.to_string().contains("A -> B -> A"));
}

#[test]
fn test_building_set_cleaned_after_circular_failure() {
    let container = Container::new();
    container.set("A", depends_on("B")).unwrap();
    container.set("B", depends_on("A")).unwrap();
    assert!(container.get("A").is_err());

    // 打破循环后同一个标识符可以正常构建
    container.set("B", RawDefinition::value(Logger::default())).unwrap();
    let a = container.get_typed::<Wrapper>("A").unwrap();
    assert!(a.inner.is::<Logger>());
}

#[test]
fn test_self_reference_yields_container() {
    let container = Container::new();
    container
        .set(
            "holder",
            RawDefinition::factory(|locator: &dyn ServiceLocator, _: &Params| {
                let locator = locator.get_typed::<LocatorRef>(LOCATOR_ID)?;
                Ok(LocatorHolder {
                    locator: (*locator).clone(),
                })
            }),
        )
        .unwrap();

    let holder = container.get_typed::<LocatorHolder>("holder").unwrap();
    assert!(holder.locator.points_to(&container));
}

#[test]
fn test_locator_self_cycle_is_permitted() {
    let container = Container::new();
    // 覆盖默认绑定，让它在构建时再次请求自身
    container
        .set(
            LOCATOR_ID,
            RawDefinition::factory(|locator: &dyn ServiceLocator, _: &Params| {
                let inner = locator.get_typed::<LocatorRef>(LOCATOR_ID)?;
                Ok((*inner).clone())
            }),
        )
        .unwrap();

    let locator = container.get_typed::<LocatorRef>(LOCATOR_ID).unwrap();
    assert!(locator.points_to(&container));
}

#[test]
fn test_tag_alias_returns_members_in_order_once() {
    let container = Container::new();
    container
        .set("first", RawDefinition::value(1u32).tagged(["numbers"]))
        .unwrap();
    container
        .set("second", RawDefinition::value(2u32).tagged(["numbers"]))
        .unwrap();
    container
        .set("first", RawDefinition::value(10u32).tagged(["numbers"]))
        .unwrap();

    assert!(container.has("tag@numbers"));
    let list = container.get("tag@numbers").unwrap().as_list().unwrap();
    let values: Vec<u32> = list
        .iter()
        .map(|instance| *instance.downcast::<u32>().unwrap())
        .collect();
    assert_eq!(values, vec![10, 2]);

    // 列表里的成员就是缓存里的实例
    assert!(list[1].ptr_eq(&container.get("second").unwrap()));
}

#[test]
fn test_tag_membership_changes_are_observed() {
    let container = Container::new();
    assert!(!container.has("tag@plugins"));
    assert!(container.get("tag@plugins").unwrap().as_list().unwrap().is_empty());

    container
        .set("p1", RawDefinition::value("p1").tagged(["plugins"]))
        .unwrap();
    assert_eq!(container.get_tagged("plugins").unwrap().len(), 1);

    container
        .set("p2", RawDefinition::value("p2").tagged(["plugins", "extra"]))
        .unwrap();
    assert_eq!(container.get_tagged("plugins").unwrap().len(), 2);
    assert_eq!(container.tags_of("p2"), vec!["extra", "plugins"]);
}

#[test]
fn test_initial_tag_map() {
    let container = Container::builder()
        .tag("handlers", ["h2", "h1", "h2"])
        .definition("h1", RawDefinition::value("one"))
        .definition("h2", RawDefinition::value("two"))
        .build()
        .unwrap();

    let handlers = container.get_tagged("handlers").unwrap();
    let names: Vec<&str> = handlers
        .iter()
        .map(|instance| *instance.downcast::<&str>().unwrap())
        .collect();
    assert_eq!(names, vec!["two", "one"]);
}

#[test]
fn test_invalid_tag_rejected() {
    let container = Container::new();
    let err = container
        .set("svc", RawDefinition::value(1u8).tagged(["ok", ""]))
        .unwrap_err();
    assert!(matches!(err, ContainerError::InvalidConfiguration(_)));
    assert!(!container.has("svc"));

    let err = Container::builder().tag(" ", ["svc"]).build().unwrap_err();
    assert!(matches!(err, ContainerError::InvalidConfiguration(_)));
}

#[test]
fn test_tag_prefixed_identifier_rejected() {
    let container = Container::new();
    let err = container
        .set("tag@plugins", RawDefinition::value(1u8))
        .unwrap_err();
    assert!(matches!(err, ContainerError::InvalidConfiguration(_)));
    assert!(!container.ids().contains(&"tag@plugins".to_string()));

    let err = Container::builder()
        .definition("tag@x", RawDefinition::value(1u8))
        .build()
        .unwrap_err();
    assert!(matches!(err, ContainerError::InvalidConfiguration(_)));
}

#[test]
fn test_missing_identifier_not_found() {
    let container = Container::new();
    assert!(!container.has("missing"));
    let err = container.get("missing").unwrap_err();
    assert!(err.is_not_found_for("missing"));
}

#[test]
fn test_nested_not_found_propagates() {
    let container = Container::new();
    container.set("A", depends_on("nowhere")).unwrap();
    let err = container.get("A").unwrap_err();
    assert!(err.is_not_found_for("nowhere"));
    assert!(!container.is_cached("A"));
}

#[test]
fn test_catalog_types_are_instantiable() {
    let catalog = Arc::new(TypeCatalog::new());
    catalog.register_default::<Logger>("Logger");
    catalog.register_abstract("Repository");
    let container = Container::builder().catalog(catalog).build().unwrap();

    assert!(container.has("Logger"));
    let first = container.get("Logger").unwrap();
    let second = container.get("Logger").unwrap();
    assert!(first.ptr_eq(&second));

    // 抽象类型不可实例化，has 为假，get 给出具体原因
    assert!(!container.has("Repository"));
    let err = container.get("Repository").unwrap_err();
    assert!(matches!(err, ContainerError::NotInstantiable { ref id, .. } if id == "Repository"));
}

#[test]
fn test_type_and_implicit_definitions() {
    let container = Container::new();
    container.catalog().register("Logger", |_: &dyn ServiceLocator, params: &Params| {
        let level = params
            .get("level")
            .and_then(|value| value.as_str())
            .unwrap_or("warn")
            .to_string();
        Ok(Logger { level })
    });

    container.set("app.logger", RawDefinition::type_ref("Logger")).unwrap();
    container.set("Logger", RawDefinition::Implicit).unwrap();

    let app_logger = container.get_typed::<Logger>("app.logger").unwrap();
    let logger = container.get_typed::<Logger>("Logger").unwrap();
    assert_eq!(app_logger.level, "warn");
    assert!(!Arc::ptr_eq(&app_logger, &logger));
}

#[test]
fn test_params_only_affect_first_build() {
    let container = Container::new();
    container
        .set(
            "logger",
            RawDefinition::factory(|_: &dyn ServiceLocator, params: &Params| {
                let level = params
                    .get("level")
                    .and_then(|value| value.as_str())
                    .unwrap_or("info")
                    .to_string();
                Ok(Logger { level })
            }),
        )
        .unwrap();

    let mut params = Params::new();
    params.insert("level".to_string(), serde_json::json!("debug"));
    let first = container.get_with("logger", &params).unwrap();
    assert_eq!(first.downcast::<Logger>().unwrap().level, "debug");

    params.insert("level".to_string(), serde_json::json!("error"));
    let second = container.get_with("logger", &params).unwrap();
    assert!(first.ptr_eq(&second));
}

#[test]
fn test_reference_shares_target_instance() {
    let container = Container::new();
    container
        .set("db", RawDefinition::factory(|_, _| Ok(Logger::default())))
        .unwrap();
    container.set("db.alias", RawDefinition::reference("db")).unwrap();

    let alias = container.get("db.alias").unwrap();
    let db = container.get("db").unwrap();
    assert!(alias.ptr_eq(&db));
}

#[test]
fn test_set_multiple_last_entry_wins() {
    let container = Container::new();
    container
        .set_multiple(vec![
            ("port", RawDefinition::value(80u16).tagged(["ports"])),
            ("port", RawDefinition::value(8080u16).tagged(["ports"])),
            ("host", RawDefinition::value("localhost")),
        ])
        .unwrap();

    assert_eq!(*container.get_typed::<u16>("port").unwrap(), 8080);
    assert_eq!(container.get_tagged("ports").unwrap().len(), 1);
    assert!(container.ids().contains(&"host".to_string()));
}

#[test]
fn test_type_cast_failure() {
    let container = Container::new();
    container.set("port", RawDefinition::value(80u16)).unwrap();

    let err = container.get_typed::<String>("port").unwrap_err();
    match err {
        ContainerError::TypeCastFailed { id, actual, .. } => {
            assert_eq!(id, "port");
            assert_eq!(actual, "u16");
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_try_factory_wraps_errors() {
    let container = Container::new();
    container
        .set(
            "db",
            RawDefinition::try_factory(|_, _| -> anyhow::Result<Logger> {
                anyhow::bail!("connection refused")
            }),
        )
        .unwrap();

    let err = container.get("db").unwrap_err();
    assert!(matches!(err, ContainerError::CreationFailed { .. }));
    assert!(err.to_string().contains("connection refused"));
}
