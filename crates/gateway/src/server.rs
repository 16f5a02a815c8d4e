use std::{collections::HashMap, net::SocketAddr, sync::Arc, time::Duration};

use {
    ackbridge_config::BridgeConfig,
    ackbridge_protocol::WS_PATH,
    axum::{
        Router,
        body::Bytes,
        extract::{
            ConnectInfo, Path, Query, State, WebSocketUpgrade,
            rejection::{PathRejection, QueryRejection},
        },
        http::{HeaderMap, StatusCode},
        response::{Html, IntoResponse, Json, Response},
        routing::{MethodFilter, MethodRouter, get, on},
    },
    tower_http::{
        cors::{Any, CorsLayer},
        trace::TraceLayer,
    },
    tracing::{info, warn},
};

use crate::{
    bridge::emit_with_ack,
    broadcast::broadcast_server_time,
    routes::{BridgeRoute, ROUTES, Reply, RouteInput, Verb},
    state::GatewayState,
    ws::handle_connection,
};

// ── Shared app state ─────────────────────────────────────────────────────────

#[derive(Clone)]
struct AppState {
    gateway: Arc<GatewayState>,
}

// ── Server startup ───────────────────────────────────────────────────────────

/// Build the gateway router (shared between production startup and tests).
pub fn build_gateway_app(state: Arc<GatewayState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut router = Router::new()
        .route("/", get(root_handler))
        .route("/client.js", get(client_js_handler))
        .route("/health", get(health_handler))
        .route(WS_PATH, get(ws_upgrade_handler));

    for route in ROUTES {
        for path in route.paths {
            router = router.route(path, bridged(route));
        }
    }

    router
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(AppState { gateway: state })
}

fn method_filter(verb: Verb) -> MethodFilter {
    match verb {
        Verb::Get => MethodFilter::GET,
        Verb::Post => MethodFilter::POST,
        Verb::Put => MethodFilter::PUT,
    }
}

type Params = Result<HashMap<String, String>, String>;

/// Handler for one table row. Routes without `{param}` segments skip the
/// `Path` extractor. Extractor rejections are passed through so they are
/// answered with the JSON envelope.
fn bridged(route: &'static BridgeRoute) -> MethodRouter<AppState> {
    let filter = method_filter(route.verb);
    if route.has_path_params() {
        on(
            filter,
            move |State(app): State<AppState>,
                  params: Result<Path<HashMap<String, String>>, PathRejection>,
                  query: Result<Query<HashMap<String, String>>, QueryRejection>,
                  headers: HeaderMap,
                  body: Bytes| async move {
                let params = params.map(|Path(p)| p).map_err(|e| e.body_text());
                let query = query.map(|Query(q)| q).map_err(|e| e.body_text());
                bridge_handler(app, route, params, query, headers, body).await
            },
        )
    } else {
        on(
            filter,
            move |State(app): State<AppState>,
                  query: Result<Query<HashMap<String, String>>, QueryRejection>,
                  headers: HeaderMap,
                  body: Bytes| async move {
                let query = query.map(|Query(q)| q).map_err(|e| e.body_text());
                bridge_handler(app, route, Ok(HashMap::new()), query, headers, body).await
            },
        )
    }
}

fn bad_request(message: String) -> Response {
    (StatusCode::BAD_REQUEST, Json(Reply::failure(message))).into_response()
}

/// Start the gateway HTTP + WebSocket server.
pub async fn start_gateway(config: BridgeConfig) -> anyhow::Result<()> {
    let state = GatewayState::new(&config);
    if state.allow_list.is_empty() {
        warn!("allow-list is empty, every peer will be rejected");
    }

    let app = build_gateway_app(Arc::clone(&state));

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Startup banner.
    let lines = [
        format!("ackbridge gateway v{}", state.version),
        format!(
            "protocol v{}, listening on {}",
            ackbridge_protocol::PROTOCOL_VERSION,
            addr
        ),
        format!("{} bridged routes", ROUTES.iter().map(|r| r.paths.len()).sum::<usize>()),
        format!("{} allowed client id(s)", state.allow_list.len()),
    ];
    let width = lines.iter().map(|l| l.len()).max().unwrap_or(0) + 4;
    info!("┌{}┐", "─".repeat(width));
    for line in &lines {
        info!("│  {:<w$}│", line, w = width - 2);
    }
    info!("└{}┘", "─".repeat(width));

    if let Some(period) = state.realtime.server_time_interval() {
        spawn_server_time(Arc::clone(&state), period);
    }

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

/// Periodically broadcast `server-time` while peers are connected.
pub fn spawn_server_time(
    state: Arc<GatewayState>,
    period: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            broadcast_server_time(&state).await;
        }
    })
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn bridge_handler(
    app: AppState,
    route: &'static BridgeRoute,
    params: Params,
    query: Params,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let (params, query) = match (params, query) {
        (Ok(params), Ok(query)) => (params, query),
        (Err(e), _) | (_, Err(e)) => return bad_request(e),
    };

    let body = if body.iter().all(u8::is_ascii_whitespace) {
        serde_json::Value::Object(Default::default())
    } else {
        match serde_json::from_slice(&body) {
            Ok(v) => v,
            Err(e) => return bad_request(format!("invalid JSON body: {e}")),
        }
    };

    let input = RouteInput {
        params,
        query,
        headers,
        body,
    };
    let payload = route.build_payload(&input);
    let timeout = app.gateway.timeout_for(route.event, route.timeout);

    let outcome = emit_with_ack(&app.gateway, route.event, payload, timeout, route.fan_in).await;
    match &outcome {
        Ok(acked) => info!(event = route.event, response = ?acked, "received responses"),
        Err(e) => warn!(event = route.event, error = %e, "error or timeout"),
    }

    let (status, reply) = route.render(outcome);
    (status, Json(reply)).into_response()
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let count = state.gateway.peer_count().await;
    Json(serde_json::json!({
        "status": "ok",
        "version": state.gateway.version,
        "protocol": ackbridge_protocol::PROTOCOL_VERSION,
        "peers": count,
    }))
}

async fn ws_upgrade_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state.gateway, addr))
}

async fn root_handler() -> impl IntoResponse {
    Html(include_str!("assets/index.html"))
}

async fn client_js_handler() -> impl IntoResponse {
    (
        [("content-type", "application/javascript; charset=utf-8")],
        include_str!("assets/client.js"),
    )
}
