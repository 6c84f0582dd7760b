//! Process-wide handler factory registry.
//!
//! Maps a handler type name (`EchoHandler`, `StaticHandler`, ...) to a
//! zero-argument factory producing a default-configured instance. The
//! routing table consults this map to validate config and to obtain
//! archetypes for handlers that take no parameters. Registration happens
//! in one place, [`register_builtin_handlers`], rather than through
//! scattered static initializers.

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::fs::RealFileSystem;
use crate::handlers::{
    CrudHandler, EchoHandler, Handler, HealthHandler, MarkdownHandler, NotFoundHandler,
    SleepHandler, StaticHandler,
};

/// A zero-argument callable producing a fresh handler instance.
pub type HandlerFactory = Arc<dyn Fn() -> Box<dyn Handler> + Send + Sync>;

static FACTORIES: Lazy<RwLock<HashMap<String, HandlerFactory>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Register `factory` under `name`. The first registration of a name wins;
/// returns false if the name was already taken.
pub fn register(name: &str, factory: HandlerFactory) -> bool {
    let mut map = FACTORIES.write().unwrap();
    if map.contains_key(name) {
        return false;
    }
    map.insert(name.to_string(), factory);
    true
}

/// Look up the archetype factory for a handler type name.
pub fn lookup(name: &str) -> Option<HandlerFactory> {
    FACTORIES.read().unwrap().get(name).cloned()
}

/// Register every built-in handler type. Safe to call more than once.
pub fn register_builtin_handlers() {
    register("EchoHandler", Arc::new(|| Box::new(EchoHandler) as Box<dyn Handler>));
    register(
        "StaticHandler",
        Arc::new(|| Box::new(StaticHandler::new("/", ".")) as Box<dyn Handler>),
    );
    register(
        "CrudHandler",
        Arc::new(|| {
            Box::new(CrudHandler::new("/api", "./data", Arc::new(RealFileSystem))) as Box<dyn Handler>
        }),
    );
    register(
        "MarkdownHandler",
        Arc::new(|| {
            Box::new(MarkdownHandler::new("/", ".", None, Arc::new(RealFileSystem)))
                as Box<dyn Handler>
        }),
    );
    register(
        "HealthRequestHandler",
        Arc::new(|| Box::new(HealthHandler) as Box<dyn Handler>),
    );
    register(
        "SleepHandler",
        Arc::new(|| Box::new(SleepHandler::default()) as Box<dyn Handler>),
    );
    register(
        "NotFoundHandler",
        Arc::new(|| Box::new(NotFoundHandler) as Box<dyn Handler>),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_registered_and_first_wins() {
        register_builtin_handlers();
        assert!(lookup("EchoHandler").is_some());
        assert!(lookup("NotFoundHandler").is_some());
        assert!(lookup("NoSuchHandler").is_none());

        // Re-registering an existing name is a no-op.
        assert!(!register(
            "EchoHandler",
            Arc::new(|| Box::new(NotFoundHandler) as Box<dyn Handler>)
        ));
        let factory = lookup("EchoHandler").unwrap();
        assert_eq!(factory().kind(), "EchoHandler");
    }
}
