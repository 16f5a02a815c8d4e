//! HTTP routes that are bridged onto peer events.
//!
//! Every row of [`ROUTES`] is served by the same handler: build the event
//! payload from the request, [`emit_with_ack`](crate::bridge::emit_with_ack),
//! and render the outcome as a JSON [`Reply`].

use std::{collections::HashMap, time::Duration};

use {
    ackbridge_protocol::events,
    axum::http::{HeaderMap, StatusCode, header},
    serde::Serialize,
    serde_json::{Map, Value},
};

use crate::bridge::{Acked, BridgeError, FanIn};

// ── Types ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    Post,
    Put,
}

/// Where a payload field is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// Named field of the JSON body.
    Body(&'static str),
    /// The whole JSON body.
    WholeBody,
    /// Path parameter.
    Param(&'static str),
    /// Query-string parameter.
    Query(&'static str),
    /// Raw header value.
    Header(&'static str),
    /// Second word of `Authorization` (`Bearer <token>`).
    BearerToken,
}

/// How a successful set of acks becomes `data`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// The ack payload(s) as received.
    AsIs,
    /// The `data` field of the first ack; no acks is a 404.
    FirstData { empty_message: &'static str },
}

/// One bridged endpoint.
#[derive(Debug, Clone, Copy)]
pub struct BridgeRoute {
    pub verb: Verb,
    /// axum paths, all served identically.
    pub paths: &'static [&'static str],
    pub event: &'static str,
    pub timeout: Duration,
    pub fan_in: FanIn,
    /// `None` emits the event with a `null` payload.
    pub payload: Option<&'static [(&'static str, Source)]>,
    pub shape: Shape,
    pub success_message: Option<&'static str>,
    pub failure_prefix: &'static str,
    pub failure_status: StatusCode,
}

/// Request pieces a payload can draw from.
#[derive(Debug, Default)]
pub struct RouteInput {
    pub params: HashMap<String, String>,
    pub query: HashMap<String, String>,
    pub headers: HeaderMap,
    pub body: Value,
}

/// Response envelope returned by every bridged route.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reply {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Reply {
    pub fn ok(message: Option<&str>, data: Value) -> Self {
        Self {
            success: true,
            message: message.map(str::to_string),
            data: Some(data),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            data: None,
        }
    }
}

// ── Route table ──────────────────────────────────────────────────────────────

const SHORT: Duration = Duration::from_secs(2);
const ERROR_OR_TIMEOUT: &str = "Error or timeout: ";

const fn route(
    verb: Verb,
    paths: &'static [&'static str],
    event: &'static str,
    payload: Option<&'static [(&'static str, Source)]>,
) -> BridgeRoute {
    BridgeRoute {
        verb,
        paths,
        event,
        timeout: SHORT,
        fan_in: FanIn::First,
        payload,
        shape: Shape::AsIs,
        success_message: None,
        failure_prefix: ERROR_OR_TIMEOUT,
        failure_status: StatusCode::OK,
    }
}

const fn messages(
    mut r: BridgeRoute,
    success: &'static str,
    failure_prefix: &'static str,
) -> BridgeRoute {
    r.success_message = Some(success);
    r.failure_prefix = failure_prefix;
    r
}

const fn fails_with(mut r: BridgeRoute, status: StatusCode) -> BridgeRoute {
    r.failure_status = status;
    r
}

const ID: &[(&str, Source)] = &[("id", Source::Param("id"))];
const ID_AND_UPDATES: &[(&str, Source)] = &[
    ("id", Source::Param("id")),
    ("updates", Source::WholeBody),
];

pub static ROUTES: &[BridgeRoute] = &[
    route(
        Verb::Post,
        &["/login"],
        events::LOGIN,
        Some(&[
            ("email", Source::Body("email")),
            ("password", Source::Body("password")),
        ]),
    ),
    route(
        Verb::Post,
        &["/change-password"],
        events::CHANGE_PASSWORD,
        Some(&[
            ("token", Source::BearerToken),
            ("newPassword", Source::Body("newPassword")),
            ("oldPassword", Source::Body("oldPassword")),
        ]),
    ),
    route(
        Verb::Post,
        &["/logout"],
        events::LOGOUT,
        Some(&[("authorization", Source::Header("authorization"))]),
    ),
    BridgeRoute {
        timeout: Duration::from_secs(20),
        ..messages(
            route(
                Verb::Post,
                &["/leave/add"],
                events::LEAVE_ADD,
                Some(&[
                    ("internId", Source::Body("internId")),
                    ("start", Source::Body("start")),
                    ("end", Source::Body("end")),
                    ("description", Source::Body("description")),
                ]),
            ),
            "Leave request added successfully.",
            "Could not add leave request: ",
        )
    },
    BridgeRoute {
        timeout: Duration::from_secs(200),
        fan_in: FanIn::All,
        shape: Shape::FirstData {
            empty_message: "No leave requests found.",
        },
        failure_status: StatusCode::INTERNAL_SERVER_ERROR,
        ..messages(
            route(Verb::Get, &["/leave/getAll"], events::LEAVE_GET_ALL, None),
            "All leave requests fetched successfully.",
            "Could not fetch leave requests: ",
        )
    },
    messages(
        route(
            Verb::Get,
            &["/leave/getAllFromIntern/{id}"],
            events::LEAVE_GET_ALL_FROM_INTERN,
            Some(ID),
        ),
        "Intern's leave requests fetched successfully.",
        "Could not fetch intern's leave requests: ",
    ),
    messages(
        route(
            Verb::Get,
            &["/leave/getAllForMentor/{id}"],
            events::LEAVE_GET_ALL_FOR_MENTOR,
            Some(ID),
        ),
        "Leave requests of the mentor's interns fetched successfully.",
        "Could not fetch mentor data: ",
    ),
    messages(
        route(
            Verb::Put,
            &["/leave/update/{id}"],
            events::LEAVE_UPDATE,
            Some(ID_AND_UPDATES),
        ),
        "Leave request updated successfully.",
        "Could not update leave request: ",
    ),
    messages(
        route(
            Verb::Put,
            &["/leave/delete/{id}"],
            events::LEAVE_DELETE,
            Some(ID),
        ),
        "Leave request deleted successfully.",
        "Could not delete leave request: ",
    ),
    route(
        Verb::Get,
        &["/mentorInternsByTerm/{id}"],
        events::MENTOR_GET_FILTERED,
        Some(&[
            ("id", Source::Param("id")),
            ("internshipId", Source::Query("internshipId")),
        ]),
    ),
    BridgeRoute {
        timeout: Duration::from_secs(2000),
        fan_in: FanIn::All,
        ..route(
            Verb::Get,
            &["/internship/getAll", "/hello"],
            events::INTERNSHIP_GET_ALL,
            None,
        )
    },
    route(
        Verb::Get,
        &["/mentorInternsGetOne/{id}"],
        events::MENTOR_GET_ONE,
        Some(ID),
    ),
    fails_with(
        route(
            Verb::Get,
            &["/announcement/getAllForUser"],
            events::ANNOUNCEMENT_GET_ALL_FOR_USER,
            Some(&[("referenceId", Source::Query("referenceId"))]),
        ),
        StatusCode::INTERNAL_SERVER_ERROR,
    ),
    fails_with(
        route(
            Verb::Get,
            &["/announcement/getOne/{id}"],
            events::ANNOUNCEMENT_GET_ONE,
            Some(ID),
        ),
        StatusCode::INTERNAL_SERVER_ERROR,
    ),
    fails_with(
        messages(
            route(
                Verb::Post,
                &["/announcement/addWithTargetIds"],
                events::ANNOUNCEMENT_ADD_WITH_TARGET_IDS,
                Some(&[
                    ("title", Source::Body("title")),
                    ("message", Source::Body("message")),
                    ("internshipId", Source::Body("internshipId")),
                    ("targetIds", Source::Body("targetIds")),
                ]),
            ),
            "Announcement created successfully.",
            ERROR_OR_TIMEOUT,
        ),
        StatusCode::INTERNAL_SERVER_ERROR,
    ),
    fails_with(
        messages(
            route(
                Verb::Put,
                &["/announcement/update/{id}"],
                events::ANNOUNCEMENT_UPDATE,
                Some(ID_AND_UPDATES),
            ),
            "Announcement updated successfully.",
            ERROR_OR_TIMEOUT,
        ),
        StatusCode::INTERNAL_SERVER_ERROR,
    ),
    fails_with(
        messages(
            route(
                Verb::Put,
                &["/announcement/delete/{id}"],
                events::ANNOUNCEMENT_DELETE,
                Some(ID),
            ),
            "Announcement deleted successfully.",
            ERROR_OR_TIMEOUT,
        ),
        StatusCode::INTERNAL_SERVER_ERROR,
    ),
];

// ── Behavior ─────────────────────────────────────────────────────────────────

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .split(' ')
        .nth(1)
}

impl Source {
    fn resolve(self, input: &RouteInput) -> Option<Value> {
        let text = |s: &String| Value::String(s.clone());
        match self {
            Self::Body(field) => input.body.get(field).cloned(),
            Self::WholeBody => Some(input.body.clone()),
            Self::Param(name) => input.params.get(name).map(text),
            Self::Query(name) => input.query.get(name).map(text),
            Self::Header(name) => input
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|v| Value::String(v.to_string())),
            Self::BearerToken => bearer_token(&input.headers).map(|t| Value::String(t.to_string())),
        }
    }
}

impl BridgeRoute {
    pub fn has_path_params(&self) -> bool {
        self.paths.iter().any(|p| p.contains('{'))
    }

    /// Event payload for this request. Absent inputs are left out.
    pub fn build_payload(&self, input: &RouteInput) -> Value {
        let Some(fields) = self.payload else {
            return Value::Null;
        };
        let map: Map<String, Value> = fields
            .iter()
            .filter_map(|(key, source)| source.resolve(input).map(|v| (key.to_string(), v)))
            .collect();
        Value::Object(map)
    }

    /// Map a bridge outcome onto an HTTP status and envelope.
    pub fn render(&self, outcome: Result<Acked, BridgeError>) -> (StatusCode, Reply) {
        let acked = match outcome {
            Ok(acked) => acked,
            Err(e) => {
                return (
                    self.failure_status,
                    Reply::failure(format!("{}{e}", self.failure_prefix)),
                );
            },
        };

        match self.shape {
            Shape::AsIs => (
                StatusCode::OK,
                Reply::ok(self.success_message, acked.into_value()),
            ),
            Shape::FirstData { empty_message } => {
                let first = match acked {
                    Acked::One(v) => Some(v),
                    Acked::Many(vs) => vs.into_iter().next(),
                };
                match first {
                    Some(ack) => {
                        let data = ack.get("data").cloned().unwrap_or(Value::Null);
                        (StatusCode::OK, Reply::ok(self.success_message, data))
                    },
                    None => (StatusCode::NOT_FOUND, Reply::failure(empty_message)),
                }
            },
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, axum::http::HeaderValue, serde_json::json};

    fn route_for(event: &str) -> &'static BridgeRoute {
        ROUTES.iter().find(|r| r.event == event).unwrap()
    }

    #[test]
    fn table_matches_timeouts() {
        let expect = [
            (events::LOGIN, 2),
            (events::LEAVE_ADD, 20),
            (events::LEAVE_GET_ALL, 200),
            (events::INTERNSHIP_GET_ALL, 2000),
            (events::ANNOUNCEMENT_DELETE, 2),
        ];
        for (event, secs) in expect {
            assert_eq!(route_for(event).timeout, Duration::from_secs(secs), "{event}");
        }
    }

    #[test]
    fn paths_are_unique_per_verb() {
        let mut seen = std::collections::HashSet::new();
        for r in ROUTES {
            for p in r.paths {
                assert!(seen.insert((r.verb, *p)), "duplicate route {p}");
            }
        }
    }

    #[test]
    fn login_payload_from_body() {
        let input = RouteInput {
            body: json!({"email": "a@b.c", "password": "pw", "extra": 1}),
            ..Default::default()
        };
        assert_eq!(
            route_for(events::LOGIN).build_payload(&input),
            json!({"email": "a@b.c", "password": "pw"})
        );
    }

    #[test]
    fn missing_fields_are_omitted() {
        let input = RouteInput {
            body: json!({"email": "a@b.c"}),
            ..Default::default()
        };
        assert_eq!(
            route_for(events::LOGIN).build_payload(&input),
            json!({"email": "a@b.c"})
        );
    }

    #[test]
    fn change_password_extracts_bearer_token() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer tok123"));
        let input = RouteInput {
            headers,
            body: json!({"newPassword": "n", "oldPassword": "o"}),
            ..Default::default()
        };
        assert_eq!(
            route_for(events::CHANGE_PASSWORD).build_payload(&input),
            json!({"token": "tok123", "newPassword": "n", "oldPassword": "o"})
        );
    }

    #[test]
    fn logout_forwards_raw_authorization() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer r1"));
        let input = RouteInput {
            headers,
            ..Default::default()
        };
        assert_eq!(
            route_for(events::LOGOUT).build_payload(&input),
            json!({"authorization": "Bearer r1"})
        );
    }

    #[test]
    fn update_wraps_body_as_updates() {
        let input = RouteInput {
            params: HashMap::from([("id".to_string(), "42".to_string())]),
            body: json!({"status": "approved"}),
            ..Default::default()
        };
        assert_eq!(
            route_for(events::LEAVE_UPDATE).build_payload(&input),
            json!({"id": "42", "updates": {"status": "approved"}})
        );
    }

    #[test]
    fn filtered_reads_param_and_query() {
        let input = RouteInput {
            params: HashMap::from([("id".to_string(), "7".to_string())]),
            query: HashMap::from([("internshipId".to_string(), "99".to_string())]),
            ..Default::default()
        };
        assert_eq!(
            route_for(events::MENTOR_GET_FILTERED).build_payload(&input),
            json!({"id": "7", "internshipId": "99"})
        );
    }

    #[test]
    fn get_all_has_no_payload() {
        assert_eq!(
            route_for(events::LEAVE_GET_ALL).build_payload(&RouteInput::default()),
            Value::Null
        );
    }

    #[test]
    fn render_success_as_is() {
        let (status, reply) = route_for(events::LOGIN).render(Ok(Acked::One(json!({"ok": 1}))));
        assert_eq!(status, StatusCode::OK);
        assert_eq!(reply, Reply::ok(None, json!({"ok": 1})));
    }

    #[test]
    fn render_first_data() {
        let r = route_for(events::LEAVE_GET_ALL);
        let (status, reply) = r.render(Ok(Acked::Many(vec![
            json!({"data": [{"id": 1}]}),
            json!({"data": [{"id": 2}]}),
        ])));
        assert_eq!(status, StatusCode::OK);
        assert!(reply.success);
        assert_eq!(reply.data, Some(json!([{"id": 1}])));
    }

    #[test]
    fn render_first_data_empty_is_404() {
        let (status, reply) = route_for(events::LEAVE_GET_ALL).render(Ok(Acked::Many(vec![])));
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(!reply.success);
        assert_eq!(reply.message.as_deref(), Some("No leave requests found."));
    }

    #[test]
    fn render_timeout_uses_route_status_and_prefix() {
        let err = BridgeError::Timeout(Duration::from_secs(2));
        let (status, reply) = route_for(events::ANNOUNCEMENT_GET_ONE).render(Err(err));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let message = reply.message.unwrap();
        assert!(message.starts_with("Error or timeout: "));
        assert!(message.contains("timed out"));

        let (status, reply) =
            route_for(events::LEAVE_ADD).render(Err(BridgeError::Timeout(Duration::from_secs(20))));
        assert_eq!(status, StatusCode::OK);
        assert!(reply.message.unwrap().starts_with("Could not add leave request: "));
    }

    #[test]
    fn reply_omits_absent_fields() {
        let v = serde_json::to_value(Reply::failure("nope")).unwrap();
        assert_eq!(v, json!({"success": false, "message": "nope"}));
    }
}
