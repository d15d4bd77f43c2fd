//! Dependency resolver handed to handlers and controllers.
//!
//! Services are stored by type; controllers by their fully qualified name
//! (see [`ControllerFactory`](crate::controller::ControllerFactory)).

use crate::controller::Controller;
use crate::error::{ServerError, ServerResult};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

type ControllerMaker = Arc<dyn Fn() -> Box<dyn Controller> + Send + Sync>;

#[derive(Default, Clone)]
pub struct Container {
    services: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    controllers: HashMap<String, ControllerMaker>,
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T: 'static + Send + Sync>(&mut self, value: T) {
        self.services.insert(TypeId::of::<T>(), Arc::new(value));
    }

    pub fn get<T: 'static>(&self) -> Option<&T> {
        self.services
            .get(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_ref())
    }

    pub fn contains<T: 'static>(&self) -> bool {
        self.services.contains_key(&TypeId::of::<T>())
    }

    /// Binds a controller constructor under its fully qualified name.
    pub fn bind_controller<F>(&mut self, name: impl Into<String>, make: F)
    where
        F: Fn() -> Box<dyn Controller> + Send + Sync + 'static,
    {
        self.controllers.insert(name.into(), Arc::new(make));
    }

    /// Builds a fresh controller instance; every dispatch gets its own.
    pub fn make_controller(&self, name: &str) -> ServerResult<Box<dyn Controller>> {
        self.controllers
            .get(name)
            .map(|make| make())
            .ok_or_else(|| ServerError::UnknownController(name.to_string()))
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut controllers: Vec<&String> = self.controllers.keys().collect();
        controllers.sort();
        f.debug_struct("Container")
            .field("services", &self.services.len())
            .field("controllers", &controllers)
            .finish()
    }
}
