use std::sync::Arc;
use std::time::Duration;

use dragon_ioc::{
    override_with, AppContext, Configure, FileSource, MemorySource, Modifiable, OrderedResolver, Registry,
    Wiring,
};

trait Pool: Send + Sync {
    fn describe(&self) -> String;
}

trait Lookup: Send + Sync {
    fn find(&self, key: &str) -> String;
}

#[derive(Default)]
struct ConnectionPool {
    size: usize,
    timeout: Modifiable<Duration>,
}

impl Configure for ConnectionPool {
    fn wiring(wiring: &mut Wiring<Self>) {
        wiring
            .value("size", |p| &mut p.size)
            .live("timeout", |p| &mut p.timeout)
            .require("size");
    }
}

impl Pool for ConnectionPool {
    fn describe(&self) -> String {
        let timeout = self
            .timeout
            .get()
            .map(|t| humantime::format_duration(t).to_string())
            .unwrap_or_else(|| "none".into());
        format!("{} connections, timeout {timeout}", self.size)
    }
}

#[derive(Default)]
struct DirectLookup {
    pool: Option<Arc<dyn Pool>>,
}

impl Configure for DirectLookup {
    fn wiring(wiring: &mut Wiring<Self>) {
        wiring.reference("pool", |l| &mut l.pool).require("pool");
    }
}

impl Lookup for DirectLookup {
    fn find(&self, key: &str) -> String {
        let pool = self.pool.as_ref().map(|p| p.describe()).unwrap_or_default();
        format!("{key} via pool ({pool})")
    }
}

#[derive(Default)]
struct CachingLookup {
    inner: Option<Arc<dyn Lookup>>,
}

impl Configure for CachingLookup {
    fn wiring(wiring: &mut Wiring<Self>) {
        wiring.reference("inner", |l| &mut l.inner).require("inner");
    }
}

impl Lookup for CachingLookup {
    fn find(&self, key: &str) -> String {
        let inner = self.inner.as_ref().map(|l| l.find(key)).unwrap_or_default();
        format!("cached[{inner}]")
    }
}

fn bindings(registry: &Registry) -> Result<(), dragon_ioc::Error> {
    registry
        .def::<ConnectionPool>()
        .iface::<dyn Pool>(|p| p)
        .prop_required("size", "pool.size")
        .prop("timeout", "pool.timeout")
        .register()?;
    registry
        .def::<ConnectionPool>()
        .iface_named::<dyn Pool>("small", |p| p)
        .text("size", "1")
        .prop("timeout", "pool.timeout")
        .register()?;

    registry
        .def::<DirectLookup>()
        .iface_named::<dyn Lookup>("direct", |l| l)
        .reference::<dyn Pool>("pool")
        .register()?;
    registry
        .def::<CachingLookup>()
        .iface_named::<dyn Lookup>("cached", |l| l)
        .reference_named::<dyn Lookup>("inner", "direct")
        .register()?;

    registry
        .ternary::<dyn Lookup>("app.cache", Some("cached"), Some("direct"))
        .register()
}

fn main() -> Result<(), dragon_ioc::Error> {
    let file = FileSource::new("demos/app.toml", true)?;
    let overrides = Arc::new(MemorySource::new());
    let resolver = OrderedResolver::new()
        .with_source("file", 10, Arc::new(file))
        .with_source("runtime", 20, overrides.clone());

    let ctx = AppContext::builder()
        .with_resolver(resolver)
        .with_bindings(bindings)
        .build()?;

    println!("app: {}", ctx.config().resolve("app.name")?);

    print!("{}", ctx.registry().dependencies::<dyn Lookup>()?);

    let lookup = ctx.get::<dyn Lookup>()?;
    println!("default lookup: {}", lookup.find("sku-1"));

    // Steer the pool for this request only; the default instance is untouched.
    let steered = ctx
        .registry()
        .get_with::<dyn Lookup>(&override_with::<dyn Pool>("small"))?;
    println!("steered lookup: {}", steered.find("sku-2"));

    overrides.set("pool.timeout", "2s");
    println!("after reload:   {}", lookup.find("sku-3"));

    let failures = ctx.self_test();
    if failures.is_empty() {
        println!("self-test passed");
    }
    for (type_name, errors) in failures {
        println!("self-test: {type_name}: {}", errors.join("; "));
    }

    Ok(())
}
