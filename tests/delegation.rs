//! End-to-end delegation over mock transports.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::StreamExt;
use graph_stitch::Context;
use graph_stitch::DelegatingResolver;
use graph_stitch::DelegationExecutor;
use graph_stitch::EventSource;
use graph_stitch::FetchError;
use graph_stitch::FieldMapping;
use graph_stitch::Fragment;
use graph_stitch::Fragments;
use graph_stitch::MappedField;
use graph_stitch::Normalized;
use graph_stitch::Object;
use graph_stitch::OperationKind;
use graph_stitch::Path;
use graph_stitch::ResolveInfo;
use graph_stitch::ResolverFactory;
use graph_stitch::Response;
use graph_stitch::ResultEnvelope;
use graph_stitch::RootFields;
use graph_stitch::RootType;
use graph_stitch::Selection;
use graph_stitch::Subgraph;
use graph_stitch::SubgraphRegistry;
use graph_stitch::SubgraphRequest;
use graph_stitch::Transform;
use graph_stitch::Transport;
use graph_stitch::Value;
use indexmap::IndexMap;
use serde_json_bytes::json;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio_stream::wrappers::ReceiverStream;
use tower::BoxError;

/// Replays a canned response and records what was submitted.
#[derive(Default)]
struct MockTransport {
    calls: AtomicUsize,
    response: Option<Response>,
    last_request: Mutex<Option<SubgraphRequest>>,
}

impl MockTransport {
    fn returning(response: Response) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            response: Some(response),
            last_request: Mutex::new(None),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn last_query(&self) -> String {
        self.last_request
            .lock()
            .unwrap()
            .as_ref()
            .map(|request| request.request.query.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(&self, request: SubgraphRequest) -> Result<Response, BoxError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request);
        match &self.response {
            Some(response) => Ok(response.clone()),
            None => Err("no canned response".into()),
        }
    }
}

/// Always fails at the wire level.
struct BrokenTransport;

#[async_trait]
impl Transport for BrokenTransport {
    async fn execute(&self, _request: SubgraphRequest) -> Result<Response, BoxError> {
        Err("connection refused".into())
    }
}

fn accounts_mapping() -> FieldMapping {
    FieldMapping::for_subgraph(
        "accounts",
        &RootFields {
            query: Some(RootType::new("Query", ["user"])),
            ..Default::default()
        },
    )
    .unwrap()
}

fn reviews_mapping() -> FieldMapping {
    FieldMapping::for_subgraph(
        "reviews",
        &RootFields {
            query: Some(RootType::new("Query", ["topReviews"])),
            subscription: Some(RootType::new("Subscription", ["reviewAdded"])),
            ..Default::default()
        },
    )
    .unwrap()
}

fn info(field: &str, selections: Vec<Selection>) -> ResolveInfo {
    ResolveInfo {
        field_name: field.to_string(),
        response_key: field.to_string(),
        path: Path::from(field),
        selections,
        ..Default::default()
    }
}

#[test_log::test(tokio::test)]
async fn delegation_builds_the_minimal_document_and_reconciles_the_result() {
    let transport = MockTransport::returning(
        Response::builder()
            .data(Some(json!({
                "user": {
                    "name": "ada",
                    "address": { "zip": "10115" }
                }
            })))
            .build(),
    );
    let subgraph = Arc::new(Subgraph::new("accounts", transport.clone()));

    let mut registry = SubgraphRegistry::new();
    registry.insert(Subgraph::new("accounts", transport.clone()));
    assert!(registry.contains("accounts"));

    let factory = ResolverFactory::new(DelegationExecutor::new());
    let resolver = factory
        .resolver(&subgraph, &accounts_mapping(), "Query", "user")
        .unwrap();

    let mut fragments = Fragments::new();
    fragments.insert(
        "addressParts".to_string(),
        Fragment {
            name: "addressParts".to_string(),
            type_condition: "User".to_string(),
            selections: vec![Selection::field("zip")],
        },
    );
    let resolve_info = ResolveInfo {
        fragments,
        ..info(
            "user",
            vec![
                Selection::field("name"),
                Selection::Field(graph_stitch::Field {
                    alias: None,
                    name: "address".to_string(),
                    arguments: IndexMap::new(),
                    selections: vec![Selection::FragmentSpread(graph_stitch::FragmentSpread {
                        name: "addressParts".to_string(),
                    })],
                }),
            ],
        )
    };

    let mut envelope = ResultEnvelope::new();
    let Normalized { value, root_errors } = resolver
        .resolve(
            None,
            IndexMap::new(),
            &Context::new(),
            &resolve_info,
            &Object::new(),
            &mut envelope,
        )
        .await
        .unwrap();

    assert_eq!(
        value,
        Some(json!({"name": "ada", "address": {"zip": "10115"}}))
    );
    assert!(root_errors.is_empty());
    assert_eq!(transport.calls(), 1);

    // only the reachable fragment is shipped, by reference, with the
    // abstract branch annotated
    assert_eq!(
        transport.last_query(),
        "query { user { name address { __typename ...addressParts } } }\n\
         fragment addressParts on User { zip }"
    );

    // provenance covers every object node of the delegated subtree
    assert_eq!(envelope.origin(&Path::from("user")), Some(&subgraph.id()));
    assert_eq!(
        envelope.origin(&Path::from("user/address")),
        Some(&subgraph.id())
    );
}

#[tokio::test]
async fn one_failing_subgraph_does_not_abort_its_siblings() {
    let accounts_transport = MockTransport::returning(
        Response::builder()
            .data(Some(json!({"user": {"name": "ada"}})))
            .build(),
    );
    let accounts = Arc::new(Subgraph::new("accounts", accounts_transport.clone()));
    let reviews = Arc::new(Subgraph::new("reviews", Arc::new(BrokenTransport)));

    let factory = ResolverFactory::new(DelegationExecutor::new());
    let user_resolver = factory
        .resolver(&accounts, &accounts_mapping(), "Query", "user")
        .unwrap();
    let reviews_resolver = factory
        .resolver(&reviews, &reviews_mapping(), "Query", "topReviews")
        .unwrap();

    let context = Context::new();
    let mut envelope = ResultEnvelope::new();

    let failure = reviews_resolver
        .resolve(
            None,
            IndexMap::new(),
            &context,
            &info("topReviews", vec![Selection::field("body")]),
            &Object::new(),
            &mut envelope,
        )
        .await
        .unwrap_err();
    let graphql_error = failure.to_graphql_error(Some(Path::from("topReviews")));
    assert_eq!(graphql_error.path, Some(Path::from("topReviews")));
    assert!(matches!(
        failure,
        FetchError::SubrequestTransportError { subgraph, .. } if subgraph == "reviews"
    ));

    // the sibling field still resolves on its own subgraph
    let sibling = user_resolver
        .resolve(
            None,
            IndexMap::new(),
            &context,
            &info("user", vec![Selection::field("name")]),
            &Object::new(),
            &mut envelope,
        )
        .await
        .unwrap();
    assert_eq!(sibling.value, Some(json!({"name": "ada"})));
    assert_eq!(accounts_transport.calls(), 1);
}

#[tokio::test]
async fn nested_reentry_short_circuits_on_matching_provenance() {
    let transport = MockTransport::returning(
        Response::builder()
            .data(Some(json!({
                "user": {
                    "name": "ada",
                    "address": { "zip": "10115" }
                }
            })))
            .errors(vec![graph_stitch::Error {
                message: "zip is stale".to_string(),
                path: Some(Path::from("user/address/zip")),
                ..Default::default()
            }])
            .build(),
    );
    let subgraph = Arc::new(Subgraph::new("accounts", transport.clone()));
    let factory = ResolverFactory::new(DelegationExecutor::new());
    let resolver = factory
        .resolver(&subgraph, &accounts_mapping(), "Query", "user")
        .unwrap();

    let mut envelope = ResultEnvelope::new();
    let parent = resolver
        .resolve(
            None,
            IndexMap::new(),
            &Context::new(),
            &info(
                "user",
                vec![
                    Selection::field("name"),
                    Selection::Field(graph_stitch::Field {
                        alias: None,
                        name: "address".to_string(),
                        arguments: IndexMap::new(),
                        selections: vec![Selection::field("zip")],
                    }),
                ],
            ),
            &Object::new(),
            &mut envelope,
        )
        .await
        .unwrap();
    let parent_value = parent.value.unwrap();
    assert_eq!(transport.calls(), 1);
    assert_eq!(
        envelope.errors_at(&Path::from("user/address/zip"))[0].message,
        "zip is stale"
    );

    // a later resolver re-enters the already-delegated subtree
    let address_resolver = DelegatingResolver::new(
        subgraph.clone(),
        MappedField {
            remote_name: "address".to_string(),
            kind: OperationKind::Query,
        },
        Arc::new(DelegationExecutor::new()),
    );
    let reentry_info = ResolveInfo {
        field_name: "address".to_string(),
        response_key: "address".to_string(),
        path: Path::from("user/address"),
        selections: vec![Selection::field("zip")],
        ..Default::default()
    };
    let reused = address_resolver
        .resolve(
            Some(&parent_value),
            IndexMap::new(),
            &Context::new(),
            &reentry_info,
            &Object::new(),
            &mut envelope,
        )
        .await
        .unwrap();

    assert_eq!(reused.value, Some(json!({"zip": "10115"})));
    // no new network-level request was issued
    assert_eq!(transport.calls(), 1);
}

struct StampRequest;

impl Transform for StampRequest {
    fn on_request(&self, mut request: SubgraphRequest) -> SubgraphRequest {
        request
            .request
            .extensions
            .insert("stamped", Value::Bool(true));
        request
    }
}

struct RenameResult;

impl Transform for RenameResult {
    fn on_result(&self, mut result: Normalized) -> Normalized {
        if let Some(object) = result.value.as_mut().and_then(Value::as_object_mut) {
            if let Some(name) = object.remove("fullName") {
                object.insert("name", name);
            }
        }
        result
    }
}

#[tokio::test]
async fn transforms_run_before_submission_and_after_normalization() {
    let transport = MockTransport::returning(
        Response::builder()
            .data(Some(json!({"user": {"fullName": "Ada Lovelace"}})))
            .build(),
    );
    let subgraph = Arc::new(
        Subgraph::new("accounts", transport.clone())
            .with_transform(Arc::new(StampRequest))
            .with_transform(Arc::new(RenameResult)),
    );
    let factory = ResolverFactory::new(DelegationExecutor::new());
    let resolver = factory
        .resolver(&subgraph, &accounts_mapping(), "Query", "user")
        .unwrap();

    let mut envelope = ResultEnvelope::new();
    let normalized = resolver
        .resolve(
            None,
            IndexMap::new(),
            &Context::new(),
            &info("user", vec![Selection::field("fullName")]),
            &Object::new(),
            &mut envelope,
        )
        .await
        .unwrap();

    assert_eq!(normalized.value, Some(json!({"name": "Ada Lovelace"})));
    let stamped = transport
        .last_request
        .lock()
        .unwrap()
        .as_ref()
        .unwrap()
        .request
        .extensions
        .get("stamped")
        .cloned();
    assert_eq!(stamped, Some(Value::Bool(true)));
}

#[tokio::test]
async fn context_entries_reach_the_transport() {
    struct ContextAsserting {
        seen: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Transport for ContextAsserting {
        async fn execute(&self, request: SubgraphRequest) -> Result<Response, BoxError> {
            let tenant: Option<String> = request.context.get("tenant")?;
            if tenant.as_deref() == Some("acme") {
                self.seen.store(true, Ordering::SeqCst);
            }
            Ok(Response::builder()
                .data(Some(json!({"user": null})))
                .build())
        }
    }

    let seen = Arc::new(AtomicBool::new(false));
    let subgraph = Arc::new(Subgraph::new(
        "accounts",
        Arc::new(ContextAsserting { seen: seen.clone() }),
    ));
    let factory = ResolverFactory::new(DelegationExecutor::new());
    let resolver = factory
        .resolver(&subgraph, &accounts_mapping(), "Query", "user")
        .unwrap();

    let context = Context::new();
    context.insert("tenant", "acme").unwrap();
    let mut envelope = ResultEnvelope::new();
    let normalized = resolver
        .resolve(
            None,
            IndexMap::new(),
            &context,
            &info("user", vec![Selection::field("name")]),
            &Object::new(),
            &mut envelope,
        )
        .await
        .unwrap();

    assert!(seen.load(Ordering::SeqCst));
    // the subgraph explicitly returned null, which is preserved as a value
    assert_eq!(normalized.value, Some(Value::Null));
}

/// Subscription transport emitting events until told to stop.
struct StreamingTransport {
    cancelled: Arc<AtomicBool>,
    stopped: Mutex<Option<oneshot::Receiver<()>>>,
}

#[async_trait]
impl Transport for StreamingTransport {
    async fn execute(&self, _request: SubgraphRequest) -> Result<Response, BoxError> {
        Err("queries are not served here".into())
    }

    async fn subscribe(&self, _request: SubgraphRequest) -> Result<EventSource, BoxError> {
        let (events_tx, events_rx) = mpsc::channel::<Response>(1);
        let (close_tx, close_rx) = oneshot::channel::<()>();
        let (stopped_tx, stopped_rx) = oneshot::channel::<()>();
        *self.stopped.lock().unwrap() = Some(stopped_rx);

        let cancelled = self.cancelled.clone();
        tokio::spawn(async move {
            let producer = async {
                let mut sequence = 0u32;
                loop {
                    sequence += 1;
                    let event = Response::builder()
                        .data(Some(json!({ "reviewAdded": { "body": format!("review {sequence}") } })))
                        .build();
                    if events_tx.send(event).await.is_err() {
                        break;
                    }
                }
            };
            tokio::select! {
                // a consumer drop makes both branches ready; poll the close
                // signal first
                biased;
                _ = close_rx => cancelled.store(true, Ordering::SeqCst),
                _ = producer => {}
            }
            let _ = stopped_tx.send(());
        });

        Ok(EventSource {
            events: ReceiverStream::new(events_rx).boxed(),
            close_signal: close_tx,
        })
    }
}

#[test_log::test(tokio::test)]
async fn delegated_subscriptions_normalize_events_and_propagate_cancellation() {
    let cancelled = Arc::new(AtomicBool::new(false));
    let transport = Arc::new(StreamingTransport {
        cancelled: cancelled.clone(),
        stopped: Mutex::new(None),
    });
    let subgraph = Arc::new(Subgraph::new("reviews", transport.clone()));
    let factory = ResolverFactory::new(DelegationExecutor::new());
    let resolver = factory
        .resolver(&subgraph, &reviews_mapping(), "Subscription", "reviewAdded")
        .unwrap();

    let mut stream = resolver
        .resolve_subscription(
            IndexMap::new(),
            &Context::new(),
            &info("reviewAdded", vec![Selection::field("body")]),
            &Object::new(),
        )
        .await
        .unwrap();

    let event = stream.next().await.unwrap();
    assert_eq!(event.value, Some(json!({"body": "review 1"})));
    assert_eq!(
        event.envelope.origin(&Path::from("reviewAdded")),
        Some(&subgraph.id())
    );

    // walking away from the consumer must terminate the backend stream
    drop(stream);
    let stopped = transport.stopped.lock().unwrap().take().unwrap();
    stopped.await.unwrap();
    assert!(cancelled.load(Ordering::SeqCst));
}

#[tokio::test]
async fn resolving_a_subscription_field_as_a_single_value_is_rejected() {
    let subgraph = Arc::new(Subgraph::new(
        "reviews",
        Arc::new(StreamingTransport {
            cancelled: Arc::new(AtomicBool::new(false)),
            stopped: Mutex::new(None),
        }),
    ));
    let factory = ResolverFactory::new(DelegationExecutor::new());
    let resolver = factory
        .resolver(&subgraph, &reviews_mapping(), "Subscription", "reviewAdded")
        .unwrap();

    let mut envelope = ResultEnvelope::new();
    let err = resolver
        .resolve(
            None,
            IndexMap::new(),
            &Context::new(),
            &info("reviewAdded", vec![Selection::field("body")]),
            &Object::new(),
            &mut envelope,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::ExecutionInvalidContent { .. }));
}
