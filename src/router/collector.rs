use crate::error::{ServerError, ServerResult};
use crate::http::Method;
use crate::router::pattern::{self, RoutePattern};
use crate::router::table::{BeforeAll, FilterSpec, HandlerRef, RouteEntry, RouteTable, VariableRoute};

/// Builds a [`RouteTable`] from registration calls.
///
/// Registration methods chain like the rest of the builder API; a malformed
/// pattern is remembered and reported by [`RouteCollector::into_table`].
#[derive(Debug, Default)]
pub struct RouteCollector {
    table: RouteTable,
    variable_routes: Vec<VariableRoute>,
    prefixes: Vec<String>,
    group_filters: Vec<FilterSpec>,
    errors: Vec<ServerError>,
}

impl RouteCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, path: &str, target: impl Into<HandlerRef>) -> &mut Self {
        self.add(&[Method::GET], path, target.into(), FilterSpec::default())
    }

    pub fn post(&mut self, path: &str, target: impl Into<HandlerRef>) -> &mut Self {
        self.add(&[Method::POST], path, target.into(), FilterSpec::default())
    }

    pub fn put(&mut self, path: &str, target: impl Into<HandlerRef>) -> &mut Self {
        self.add(&[Method::PUT], path, target.into(), FilterSpec::default())
    }

    pub fn patch(&mut self, path: &str, target: impl Into<HandlerRef>) -> &mut Self {
        self.add(&[Method::PATCH], path, target.into(), FilterSpec::default())
    }

    pub fn delete(&mut self, path: &str, target: impl Into<HandlerRef>) -> &mut Self {
        self.add(&[Method::DELETE], path, target.into(), FilterSpec::default())
    }

    pub fn head(&mut self, path: &str, target: impl Into<HandlerRef>) -> &mut Self {
        self.add(&[Method::HEAD], path, target.into(), FilterSpec::default())
    }

    pub fn options(&mut self, path: &str, target: impl Into<HandlerRef>) -> &mut Self {
        self.add(&[Method::OPTIONS], path, target.into(), FilterSpec::default())
    }

    /// Registers a handler for every method not registered explicitly on the same path.
    pub fn any(&mut self, path: &str, target: impl Into<HandlerRef>) -> &mut Self {
        self.add(&[Method::ANY], path, target.into(), FilterSpec::default())
    }

    pub fn route(
        &mut self,
        methods: &[Method],
        path: &str,
        target: impl Into<HandlerRef>,
        filters: FilterSpec,
    ) -> &mut Self {
        self.add(methods, path, target.into(), filters)
    }

    /// Registers routes under a common prefix and filter set.
    pub fn group<F>(&mut self, prefix: &str, filters: FilterSpec, routes: F) -> &mut Self
    where
        F: FnOnce(&mut RouteCollector),
    {
        self.prefixes.push(prefix.trim_matches('/').to_string());
        self.group_filters.push(filters);
        routes(self);
        self.group_filters.pop();
        self.prefixes.pop();
        self
    }

    /// Declares a filter name and the registered callback that implements it.
    pub fn filter(&mut self, name: impl Into<String>, callback: impl Into<String>) -> &mut Self {
        self.table.add_filter(name, callback);
        self
    }

    pub fn before_all<M: AsRef<str>>(&mut self, methods: &[M], callback: impl Into<String>) -> &mut Self {
        self.table
            .set_before_all(Some(BeforeAll::new(methods, callback)));
        self
    }

    pub fn into_table(self) -> ServerResult<RouteTable> {
        if let Some(err) = self.errors.into_iter().next() {
            return Err(err);
        }
        let mut table = self.table;
        table.extend_variable_routes(self.variable_routes)?;
        Ok(table)
    }

    fn add(&mut self, methods: &[Method], path: &str, handler: HandlerRef, filters: FilterSpec) -> &mut Self {
        let full_path = self.full_path(path);
        let filters = self
            .group_filters
            .iter()
            .rev()
            .fold(filters, |inner, outer| FilterSpec::nested(outer, &inner));

        let compiled = match pattern::compile(&full_path) {
            Ok(compiled) => compiled,
            Err(err) => {
                self.errors.push(err);
                return self;
            }
        };

        for &method in methods {
            let entry = RouteEntry {
                handler: handler.clone(),
                filters: filters.clone(),
            };
            match &compiled {
                RoutePattern::Static(path) => self.table.add_static(path, method, entry),
                RoutePattern::Variable { regex, variables } => {
                    self.add_variable(regex, variables, method, entry)
                }
            }
        }
        self
    }

    fn add_variable(&mut self, regex: &str, variables: &[String], method: Method, entry: RouteEntry) {
        match self.variable_routes.iter_mut().find(|route| route.regex == regex) {
            Some(route) => {
                route.variables = variables.to_vec();
                route.methods.insert(method, entry);
            }
            None => {
                let mut route = VariableRoute::new(regex, variables.to_vec());
                route.methods.insert(method, entry);
                self.variable_routes.push(route);
            }
        }
    }

    fn full_path(&self, path: &str) -> String {
        self.prefixes
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(path.trim_matches('/')))
            .filter(|segment| !segment.is_empty())
            .collect::<Vec<_>>()
            .join("/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_and_variable_routes_are_separated() {
        let mut collector = RouteCollector::new();
        collector
            .get("/users", "users.index")
            .get("/users/{id}", "UserController@show")
            .post("/users", "users.store");
        let table = collector.into_table().unwrap();

        let users = &table.static_routes()["users"];
        assert_eq!(users.len(), 2);
        assert_eq!(table.variable_routes().len(), 1);
        assert_eq!(table.route_count(), 3);
    }

    #[test]
    fn later_registration_wins() {
        let mut collector = RouteCollector::new();
        collector.get("/a", "first").get("/a", "second");
        collector.get("/b/{x}", "first").get("/b/{x}", "second");
        let table = collector.into_table().unwrap();

        assert_eq!(
            table.static_routes()["a"][&Method::GET].handler,
            HandlerRef::closure("second")
        );
        let route = table.variable_routes()[0].routes().next().unwrap();
        assert_eq!(route.methods[&Method::GET].handler, HandlerRef::closure("second"));
    }

    #[test]
    fn groups_prefix_paths_and_prepend_filters() {
        let mut collector = RouteCollector::new();
        collector.group("/admin/", FilterSpec::new().before("auth"), |admin| {
            admin.group("reports", FilterSpec::new().after("audit"), |reports| {
                reports.route(
                    &[Method::GET],
                    "/{year:i}",
                    "reports.show",
                    FilterSpec::new().before("cache"),
                );
            });
            admin.get("/", "admin.home");
        });
        collector.get("/outside", "outside");
        let table = collector.into_table().unwrap();

        let home = &table.static_routes()["admin"][&Method::GET];
        assert_eq!(home.filters.before, vec!["auth"]);
        assert!(table.static_routes()["outside"][&Method::GET].filters.is_empty());

        let (route, vars) = table.variable_routes()[0]
            .match_path("admin/reports/2024")
            .unwrap();
        let entry = &route.methods[&Method::GET];
        assert_eq!(entry.filters.before, vec!["auth", "cache"]);
        assert_eq!(entry.filters.after, vec!["audit"]);
        assert_eq!(vars, vec![("year".to_string(), "2024".to_string())]);
    }

    #[test]
    fn invalid_pattern_surfaces_on_build() {
        let mut collector = RouteCollector::new();
        collector.get("/users/{id", "broken").get("/fine", "fine");
        assert!(matches!(
            collector.into_table(),
            Err(ServerError::InvalidRoute { .. })
        ));
    }

    #[test]
    fn filters_and_hook_are_recorded() {
        let mut collector = RouteCollector::new();
        collector
            .filter("auth", "auth_check")
            .before_all(&["POST"], "csrf");
        let table = collector.into_table().unwrap();
        assert_eq!(table.filters()[0].callback, "auth_check");
        assert_eq!(table.before_all().unwrap().callback, "csrf");
    }
}
