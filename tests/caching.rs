use patchloom::{Engine, Environment, SourceLoader, Value};
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Loader that counts how often the engine asks for source.
struct CountingLoader {
    source: String,
    loads: Arc<AtomicUsize>,
}

impl SourceLoader for CountingLoader {
    fn load(&self, _component: &str) -> io::Result<String> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(self.source.clone())
    }
}

fn counting_engine(source: &str, caching: bool) -> (Engine, Arc<AtomicUsize>) {
    let loads = Arc::new(AtomicUsize::new(0));
    let loader = CountingLoader {
        source: source.to_string(),
        loads: loads.clone(),
    };
    let engine = Engine::new(Environment::builder(loader).caching(caching).build());
    (engine, loads)
}

#[tokio::test]
async fn caching_mode_parses_once() {
    let (engine, loads) = counting_engine("$(title)", true);
    for _ in 0..3 {
        let mut locals = HashMap::new();
        locals.insert("title".to_string(), Value::from("t"));
        engine.render("page", locals).await.unwrap();
    }
    assert_eq!(loads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn non_caching_mode_reloads_every_render() {
    let (engine, loads) = counting_engine("static", false);
    for _ in 0..3 {
        engine.render("page", HashMap::new()).await.unwrap();
    }
    assert_eq!(loads.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn clear_cache_forces_a_reload() {
    let (engine, loads) = counting_engine("static", true);
    engine.render("page", HashMap::new()).await.unwrap();
    engine.render("page", HashMap::new()).await.unwrap();
    assert_eq!(loads.load(Ordering::SeqCst), 1);

    engine.clear_cache();
    engine.render("page", HashMap::new()).await.unwrap();
    assert_eq!(loads.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn cache_entries_are_keyed_by_identifier() {
    // One loader serves every identifier; each distinct identifier is
    // parsed once in caching mode.
    let (engine, loads) = counting_engine("same source", true);
    engine.render("a", HashMap::new()).await.unwrap();
    engine.render("b", HashMap::new()).await.unwrap();
    engine.render("a", HashMap::new()).await.unwrap();
    assert_eq!(loads.load(Ordering::SeqCst), 2);
}
