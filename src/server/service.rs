use super::http_server::{HttpServer, ServerHandle};
use super::request::{parse_request, ParsedRequest};
use super::response::write_reply;
use crate::config::Config;
use crate::daemon::{self, BackgroundRunner, CommandRunner};
use crate::error::ServantError;
use crate::params::{GlobalParams, ParamStore};
use crate::registry::{HandlerFactory, Resource, ResourceRegistry};
use crate::resources;
use crate::servant_error;
use crate::security::{Authenticator, ConfigAuthenticator, ConfigPermissions, PermissionChecker};
use crate::session::{Reply, Session};
use crate::uri::parse_uri_path;
use http::StatusCode;
use may_minihttp::{HttpService, Request, Response};
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

/// Request dispatcher plus everything it was configured with.
///
/// Immutable after [`ServerBuilder::build`]; the only mutable state is the
/// session id counter.
pub struct Server {
    config: Arc<Config>,
    resources: ResourceRegistry,
    authenticator: Arc<dyn Authenticator>,
    permissions: Arc<dyn PermissionChecker>,
    params: Arc<dyn ParamStore>,
    runner: Arc<dyn BackgroundRunner>,
    next_session_id: AtomicU64,
}

/// Collects the pluggable parts of a [`Server`].
///
/// Unset parts default to the config-backed implementations, and the
/// `commands` and `files` resources are registered with the built-in handlers.
pub struct ServerBuilder {
    config: Config,
    resources: ResourceRegistry,
    authenticator: Option<Arc<dyn Authenticator>>,
    permissions: Option<Arc<dyn PermissionChecker>>,
    params: Option<Arc<dyn ParamStore>>,
    runner: Option<Arc<dyn BackgroundRunner>>,
}

impl ServerBuilder {
    fn new(config: Config) -> Self {
        let mut registry = ResourceRegistry::new();
        registry.register(Resource::Commands, resources::commands::new_command_server);
        registry.register(Resource::Files, resources::files::new_file_server);
        Self {
            config,
            resources: registry,
            authenticator: None,
            permissions: None,
            params: None,
            runner: None,
        }
    }

    /// Register (or replace) the handler constructor for a resource family.
    #[must_use]
    pub fn resource(mut self, resource: Resource, factory: HandlerFactory) -> Self {
        self.resources.register(resource, factory);
        self
    }

    /// Start from an empty resource table.
    #[must_use]
    pub fn without_builtin_resources(mut self) -> Self {
        self.resources = ResourceRegistry::new();
        self
    }

    #[must_use]
    pub fn authenticator(mut self, authenticator: impl Authenticator + 'static) -> Self {
        self.authenticator = Some(Arc::new(authenticator));
        self
    }

    #[must_use]
    pub fn permissions(mut self, permissions: impl PermissionChecker + 'static) -> Self {
        self.permissions = Some(Arc::new(permissions));
        self
    }

    #[must_use]
    pub fn params(mut self, params: impl ParamStore + 'static) -> Self {
        self.params = Some(Arc::new(params));
        self
    }

    #[must_use]
    pub fn runner(mut self, runner: impl BackgroundRunner + 'static) -> Self {
        self.runner = Some(Arc::new(runner));
        self
    }

    #[must_use]
    pub fn build(self) -> Server {
        let params = self
            .params
            .unwrap_or_else(|| Arc::new(GlobalParams::new(self.config.params.clone())));
        let runner = self
            .runner
            .unwrap_or_else(|| Arc::new(CommandRunner::new(Arc::clone(&params))));
        Server {
            config: Arc::new(self.config),
            resources: self.resources,
            authenticator: self.authenticator.unwrap_or_else(|| Arc::new(ConfigAuthenticator)),
            permissions: self.permissions.unwrap_or_else(|| Arc::new(ConfigPermissions)),
            params,
            runner,
            next_session_id: AtomicU64::new(0),
        }
    }
}

impl Server {
    #[must_use]
    pub fn builder(config: Config) -> ServerBuilder {
        ServerBuilder::new(config)
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn resources(&self) -> &ResourceRegistry {
        &self.resources
    }

    /// Create the session for one request with the next id.
    fn new_session(&self, request: ParsedRequest) -> Session {
        let id = self.next_session_id.fetch_add(1, Ordering::Relaxed) + 1;
        let segments = parse_uri_path(&request.path);
        Session::new(
            id,
            Arc::clone(&self.config),
            Arc::clone(&self.params),
            segments,
            request,
        )
    }

    /// Run one request through authentication, authorization and the
    /// resource handler, returning the buffered reply.
    ///
    /// The gates run in a fixed order and the first refusal ends the request:
    /// authentication (403), permission (403), resource lookup (404). No
    /// handler is built for a refused request.
    pub fn serve(&self, request: ParsedRequest) -> Reply {
        let mut sess = self.new_session(request);
        let remote = sess
            .request()
            .remote_addr
            .map_or_else(|| "-".to_string(), |a| a.to_string());
        info!(session_id = sess.id(), "+ {} {} {}", remote, sess.method(), sess.path());

        match self.authenticator.authenticate(&sess) {
            Ok(user) => sess.set_username(user),
            Err(e) => {
                sess.fail(&ServantError::forbidden(format!("auth failed: {e}")));
                return sess.into_reply();
            }
        }

        if !self.permissions.check_permission(&sess) {
            let err = servant_error!(StatusCode::FORBIDDEN, "access of {} forbidden", sess.path());
            sess.fail(&err);
            return sess.into_reply();
        }

        let Some(factory) = self.resources.lookup(sess.resource()) else {
            sess.fail(&ServantError::not_found("unknown resource"));
            return sess.into_reply();
        };

        {
            let mut handler = factory(&mut sess);
            handler.serve();
        }
        sess.into_reply()
    }

    /// Start one thread per configured daemon.
    ///
    /// # Errors
    ///
    /// Fails if a thread cannot be spawned.
    pub fn start_daemons(&self) -> io::Result<usize> {
        daemon::start_daemons(&self.config, &self.runner)
    }

    /// Start one thread per configured timer.
    ///
    /// # Errors
    ///
    /// Fails if a thread cannot be spawned.
    pub fn start_timers(&self) -> io::Result<usize> {
        daemon::start_timers(&self.config, &self.runner)
    }

    /// Start daemons, timers and the HTTP listener on `server.listen`.
    ///
    /// # Errors
    ///
    /// Fails if the listen address is invalid or cannot be bound, or if a
    /// background thread cannot be spawned.
    pub fn start(self) -> io::Result<ServerHandle> {
        let addr = self
            .config
            .listen_addr()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        self.start_daemons()?;
        self.start_timers()?;
        let handle = HttpServer(AppService::new(Arc::new(self))).start(addr)?;
        info!(addr = %handle.addr(), "listening");
        Ok(handle)
    }
}

/// `may_minihttp` service: one clone per connection, all sharing the server.
#[derive(Clone)]
pub struct AppService {
    server: Arc<Server>,
}

impl AppService {
    #[must_use]
    pub fn new(server: Arc<Server>) -> Self {
        Self { server }
    }
}

impl HttpService for AppService {
    fn call(&mut self, req: Request, res: &mut Response) -> io::Result<()> {
        let reply = self.server.serve(parse_request(req));
        write_reply(res, reply);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SERVANT_ERR_HEADER;
    use crate::registry::Handler;
    use crate::security::AllowAll;
    use http::Method;

    struct Echo<'s> {
        sess: &'s mut Session,
    }

    impl Handler for Echo<'_> {
        fn serve(&mut self) {
            let body = format!("{}|{}", self.sess.username(), self.sess.tail());
            self.sess.write_body(body.as_bytes());
        }
    }

    fn echo(sess: &mut Session) -> Box<dyn Handler + '_> {
        Box::new(Echo { sess })
    }

    fn open_server() -> Server {
        Server::builder(Config::default())
            .without_builtin_resources()
            .resource(Resource::Databases, echo)
            .authenticator(AllowAll)
            .permissions(AllowAll)
            .build()
    }

    #[test]
    fn test_serve_reaches_handler() {
        let server = open_server();
        let reply = server.serve(ParsedRequest::from_target(Method::GET, "/databases/main/users/42"));
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.body, b"|/42");
        assert!(reply.header(SERVANT_ERR_HEADER).is_none());
    }

    #[test]
    fn test_unregistered_and_malformed_paths_are_unknown() {
        let server = open_server();
        for target in ["/commands/a/b", "/nope/a/b", "/databases/only-two", "/"] {
            let reply = server.serve(ParsedRequest::from_target(Method::GET, target));
            assert_eq!(reply.status, StatusCode::NOT_FOUND, "{target}");
            assert_eq!(reply.header(SERVANT_ERR_HEADER), Some("unknown resource"));
        }
    }

    #[test]
    fn test_session_ids_increase() {
        let server = open_server();
        let first = server.new_session(ParsedRequest::from_target(Method::GET, "/"));
        let second = server.new_session(ParsedRequest::from_target(Method::GET, "/"));
        assert_eq!(first.id(), 1);
        assert_eq!(second.id(), 2);
    }

    #[test]
    fn test_builder_registers_builtin_resources() {
        let server = Server::builder(Config::default()).build();
        assert!(server.resources().contains(Resource::Commands));
        assert!(server.resources().contains(Resource::Files));
        assert!(!server.resources().contains(Resource::Databases));
    }
}
