use patchloom::{
    async_tool_fn, tool_fn, Engine, EngineError, Environment, ErrorKind, MapLoader, Value,
};
use std::collections::HashMap;
use std::time::Duration;

fn locals(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

#[tokio::test]
async fn synchronous_tool_call() {
    let loader = MapLoader::new().insert("page", "$(upper(name))");
    let engine = Engine::new(
        Environment::builder(loader)
            .tool(
                "upper",
                tool_fn(|args| match args.first() {
                    Some(Value::String(s)) => Value::from(s.to_uppercase()),
                    _ => Value::Undefined,
                }),
            )
            .build(),
    );
    let rendered = engine
        .render("page", locals(&[("name", Value::from("hi"))]))
        .await
        .unwrap();
    assert_eq!(rendered, "HI");
}

#[tokio::test]
async fn tool_arguments_evaluate_in_the_current_scope() {
    let loader = MapLoader::new().insert("page", "$foreach(n, nums)$(double(n))$endforeach");
    let engine = Engine::new(
        Environment::builder(loader)
            .tool(
                "double",
                tool_fn(|args| match args.first() {
                    Some(Value::Number(n)) => Value::Number(n * 2.0),
                    _ => Value::Undefined,
                }),
            )
            .build(),
    );
    let nums = Value::Array(vec![Value::from(1), Value::from(2), Value::from(3)]);
    let rendered = engine
        .render("page", locals(&[("nums", nums)]))
        .await
        .unwrap();
    assert_eq!(rendered, "246");
}

#[tokio::test]
async fn deferred_tools_keep_document_order() {
    // The slow tool finishes last in wall time, yet its output lands
    // first because each node completes before its next sibling.
    let loader = MapLoader::new().insert("page", "1$(slow())2$(fast())3");
    let engine = Engine::new(
        Environment::builder(loader)
            .tool(
                "slow",
                async_tool_fn(|_args| {
                    Box::pin(async {
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Value::from("S")
                    })
                }),
            )
            .tool(
                "fast",
                async_tool_fn(|_args| Box::pin(async { Value::from("F") })),
            )
            .build(),
    );
    let rendered = engine.render("page", HashMap::new()).await.unwrap();
    assert_eq!(rendered, "1S2F3");
}

#[tokio::test]
async fn deterministic_rerender_with_async_tool() {
    let loader = MapLoader::new().insert("page", "$(stamp())/$(stamp())");
    let engine = Engine::new(
        Environment::builder(loader)
            .tool(
                "stamp",
                async_tool_fn(|_args| {
                    Box::pin(async {
                        tokio::time::sleep(Duration::from_millis(1)).await;
                        Value::from("fixed")
                    })
                }),
            )
            .build(),
    );
    let first = engine.render("page", HashMap::new()).await.unwrap();
    let second = engine.render("page", HashMap::new()).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first, "fixed/fixed");
}

#[tokio::test]
async fn unregistered_tool_is_a_reference_error() {
    let loader = MapLoader::new().insert("page", "line1\n$(missing_tool())");
    let engine = Engine::new(Environment::builder(loader).build());
    let err = engine.render("page", HashMap::new()).await.unwrap_err();
    match &err {
        EngineError::UnresolvedTool { name, line } => {
            assert_eq!(name, "missing_tool");
            assert_eq!(*line, 2);
        }
        other => panic!("expected UnresolvedTool, got {:?}", other),
    }
    assert_eq!(err.kind(), ErrorKind::Reference);
}

#[tokio::test]
async fn short_circuit_skips_the_right_hand_tool() {
    // `boom` is unregistered, but the falsy left side of && means it is
    // never looked up.
    let loader = MapLoader::new().insert("page", "$if(absent && boom())A$else B$endif");
    let engine = Engine::new(Environment::builder(loader).build());
    let rendered = engine.render("page", HashMap::new()).await.unwrap();
    assert_eq!(rendered, " B");
}

#[tokio::test]
async fn tool_result_drives_conditions() {
    let loader = MapLoader::new().insert("page", "$if(allowed(role))yes$else no$endif");
    let engine = Engine::new(
        Environment::builder(loader)
            .tool(
                "allowed",
                tool_fn(|args| Value::Bool(matches!(args.first(), Some(Value::String(s)) if s == "admin"))),
            )
            .build(),
    );
    let rendered = engine
        .render("page", locals(&[("role", Value::from("admin"))]))
        .await
        .unwrap();
    assert_eq!(rendered, "yes");
    let rendered = engine
        .render("page", locals(&[("role", Value::from("guest"))]))
        .await
        .unwrap();
    assert_eq!(rendered, " no");
}

#[tokio::test]
async fn async_tool_inside_nested_render_binding() {
    let loader = MapLoader::new()
        .insert("card", "[$(label)]")
        .insert("page", "$render('card', label=fetch())$endrender");
    let engine = Engine::new(
        Environment::builder(loader)
            .tool(
                "fetch",
                async_tool_fn(|_args| {
                    Box::pin(async {
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        Value::from("loaded")
                    })
                }),
            )
            .build(),
    );
    let rendered = engine.render("page", HashMap::new()).await.unwrap();
    assert_eq!(rendered, "[loaded]");
}

#[tokio::test]
async fn concurrent_renders_share_one_engine() {
    let loader = MapLoader::new().insert("page", "$(who)");
    let engine = std::sync::Arc::new(Engine::new(Environment::builder(loader).build()));

    let a = {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine
                .render("page", locals(&[("who", Value::from("a"))]))
                .await
        })
    };
    let b = {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine
                .render("page", locals(&[("who", Value::from("b"))]))
                .await
        })
    };
    assert_eq!(a.await.unwrap().unwrap(), "a");
    assert_eq!(b.await.unwrap().unwrap(), "b");
}
