//! End-to-end compile-and-load scenarios over a small User/Address mapping.

use strata::prelude::*;
use strata::{LoadTrigger, LoaderStrategy};

fn mapping() -> MapperRegistry {
    let user = Mapper::builder(EntityDescriptor::new("User", "users", ["id"]))
        .column("id")
        .column("name")
        .relationship(
            "addresses",
            RelationshipSpec::new("Address", RelationshipKind::OneToMany)
                .remote_key("user_id")
                .order_by("addresses.id"),
        )
        .expect("addresses relationship")
        .build()
        .expect("build User mapper");
    let address = Mapper::builder(EntityDescriptor::new("Address", "addresses", ["id"]))
        .column("id")
        .column("user_id")
        .column("email")
        .build()
        .expect("build Address mapper");

    let mut registry = MapperRegistry::new();
    registry.add(user).expect("add User");
    registry.add(address).expect("add Address");
    registry.configure().expect("configure mappers");
    registry
}

fn property<'a>(mapper: &'a Mapper, key: &str) -> &'a StrategizedProperty {
    mapper
        .get_property(key)
        .expect("mapped property")
        .as_strategized()
        .expect("strategized property")
}

fn row(compiled: &CompiledSelect, values: Vec<Value>) -> Row {
    Row::with_columns(Arc::clone(compiled.columns()), values)
}

#[test]
fn default_lazy_relationship_schedules_deferred_load() {
    let registry = mapping();
    let user = registry.get("User").unwrap();
    let addresses = property(user, "addresses");
    assert_eq!(addresses.strategy().unwrap().name(), "LazyLoader");

    let compiled = Compiler::default().compile(&Select::new(user)).unwrap();
    assert_eq!(
        compiled.sql(),
        "SELECT users.id AS users__id, users.name AS users__name FROM users"
    );

    let result = compiled
        .instances(&[row(&compiled, vec![Value::BigInt(7), Value::from("ed")])])
        .unwrap();
    assert_eq!(result.instances.len(), 1);
    assert!(result.post_loads.is_empty());

    let instance = &result.instances[0];
    assert!(!instance.is_loaded("addresses"));
    let pending = instance.pending_load("addresses").unwrap().unwrap();
    assert_eq!(pending.strategy, "LazyLoader");
    assert_eq!(
        pending.trigger,
        LoadTrigger::Sql {
            sql: "SELECT addresses.id AS addresses__id, addresses.user_id AS addresses__user_id, \
                  addresses.email AS addresses__email FROM addresses \
                  WHERE addresses.user_id = ? ORDER BY addresses.id"
                .to_string(),
            params: vec![Value::BigInt(7)],
        }
    );
}

#[test]
fn exact_joined_option_adds_join_and_fills_collection() {
    let registry = mapping();
    let user = registry.get("User").unwrap();
    let addresses = property(user, "addresses");
    let lazy = addresses.strategy().unwrap();

    let select = Select::new(user).option(Load::new(user).joinedload("addresses").unwrap());
    let compiled = Compiler::default().compile(&select).unwrap();
    assert_eq!(
        compiled.sql(),
        "SELECT users.id AS users__id, users.name AS users__name, \
         addresses_1.id AS addresses_1__id, addresses_1.user_id AS addresses_1__user_id, \
         addresses_1.email AS addresses_1__email FROM users \
         LEFT JOIN addresses AS addresses_1 ON users.id = addresses_1.user_id \
         ORDER BY addresses_1.id"
    );

    let joined = addresses
        .get_strategy(&strategy_key!(lazy = "joined"))
        .unwrap();
    assert_eq!(joined.name(), "JoinedLoader");
    assert!(!Arc::ptr_eq(&joined, &lazy));

    let rows = vec![
        row(
            &compiled,
            vec![
                Value::BigInt(1),
                Value::from("ed"),
                Value::BigInt(10),
                Value::BigInt(1),
                Value::from("ed@home"),
            ],
        ),
        row(
            &compiled,
            vec![
                Value::BigInt(1),
                Value::from("ed"),
                Value::BigInt(11),
                Value::BigInt(1),
                Value::from("ed@work"),
            ],
        ),
        row(
            &compiled,
            vec![Value::BigInt(2), Value::from("wendy"), Value::Null, Value::Null, Value::Null],
        ),
    ];
    let result = compiled.instances(&rows).unwrap();
    assert_eq!(result.instances.len(), 2);

    let ed = &result.instances[0];
    assert!(ed.deferred("addresses").is_none());
    let emails: Vec<&Value> = ed
        .collection("addresses")
        .unwrap()
        .iter()
        .filter_map(|a| a.scalar("email"))
        .collect();
    assert_eq!(emails, [&Value::from("ed@home"), &Value::from("ed@work")]);

    let wendy = &result.instances[1];
    assert_eq!(wendy.collection("addresses").map(<[_]>::len), Some(0));
}

#[test]
fn relationship_wildcard_leaves_columns_alone() {
    let registry = mapping();
    let user = registry.get("User").unwrap();
    let option = Load::new(user).wildcard("relationship", strategy_key!(lazy = "joined"));
    let compiled = Compiler::default()
        .compile(&Select::new(user).option(option))
        .unwrap();

    assert!(compiled.sql().contains("users.name AS users__name"));
    assert!(compiled.sql().contains("LEFT JOIN addresses AS addresses_1"));
    // the target's own relationships sit under a different wildcard key
    assert_eq!(compiled.sql().matches("JOIN").count(), 1);

    let result = compiled
        .instances(&[row(
            &compiled,
            vec![
                Value::BigInt(1),
                Value::from("ed"),
                Value::BigInt(10),
                Value::BigInt(1),
                Value::from("ed@home"),
            ],
        )])
        .unwrap();
    let ed = &result.instances[0];
    assert_eq!(ed.scalar("name"), Some(&Value::from("ed")));
    assert_eq!(ed.collection("addresses").map(<[_]>::len), Some(1));
    assert_eq!(property(user, "name").strategy().unwrap().name(), "ColumnLoader");
}

#[test]
fn relationship_key_on_column_names_owning_property_type() {
    let registry = mapping();
    let user = registry.get("User").unwrap();
    let option = Load::new(user)
        .set_strategy("name", strategy_key!(lazy = "joined"))
        .unwrap();

    let err = Compiler::default()
        .compile(&Select::new(user).option(option))
        .unwrap_err();
    let Error::LoaderStrategy(err) = err else {
        panic!("expected a loader strategy error, got {err:?}");
    };
    assert_eq!(err.requesting_class, "ColumnProperty");
    assert_eq!(err.property, "User.name");
    assert_eq!(err.intended_class, Some("RelationshipProperty"));
    assert_eq!(err.actual_strategy, Some("JoinedLoader"));
    assert_eq!(err.key, strategy_key!(lazy = "joined"));
    assert!(err.to_string().contains("intended to be used with a \"RelationshipProperty\""));
}

#[test]
fn compiled_statements_are_cached_by_shape() {
    let registry = mapping();
    let user = registry.get("User").unwrap();
    let compiler = Compiler::new(OrmConfig::new().statement_cache_size(8));

    let joined = || Select::new(user).option(Load::new(user).joinedload("addresses").unwrap());
    let first = compiler.compile(&joined()).unwrap();
    let second = compiler.compile(&joined()).unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    let selectin = Select::new(user).option(Load::new(user).selectinload("addresses").unwrap());
    let third = compiler.compile(&selectin).unwrap();
    assert!(!Arc::ptr_eq(&first, &third));
    assert_eq!(compiler.cache_misses(), 2);
}

#[test]
fn loader_criteria_reach_lazy_statements() {
    let registry = mapping();
    let user = registry.get("User").unwrap();
    let select = Select::new(user).option(with_loader_criteria("Address", "addresses.email IS NOT NULL"));
    let compiled = Compiler::default().compile(&select).unwrap();
    let result = compiled
        .instances(&[row(&compiled, vec![Value::BigInt(3), Value::from("jack")])])
        .unwrap();
    let pending = result.instances[0].pending_load("addresses").unwrap().unwrap();
    let LoadTrigger::Sql { sql, .. } = &pending.trigger else {
        panic!("expected a SQL trigger");
    };
    assert!(sql.ends_with(
        "WHERE addresses.user_id = ? AND addresses.email IS NOT NULL ORDER BY addresses.id"
    ));
}
