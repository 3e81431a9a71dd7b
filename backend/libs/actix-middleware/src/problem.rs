use actix_web::{
    body::BoxBody,
    http::{
        header::{HeaderName, HeaderValue, CONTENT_TYPE},
        StatusCode,
    },
    HttpResponse, ResponseError,
};
use error_types::{ProblemDetails, PROBLEM_CONTENT_TYPE};
use std::fmt;

/// A problem-details response produced by middleware before the handler runs.
#[derive(Debug)]
pub(crate) struct ProblemResponse {
    problem: ProblemDetails,
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl ProblemResponse {
    pub(crate) fn new(problem: ProblemDetails) -> Self {
        Self {
            problem,
            headers: Vec::new(),
        }
    }

    pub(crate) fn with_headers(mut self, headers: Vec<(HeaderName, HeaderValue)>) -> Self {
        self.headers = headers;
        self
    }
}

impl fmt::Display for ProblemResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.problem.title, self.problem.status)
    }
}

impl ResponseError for ProblemResponse {
    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.problem.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn error_response(&self) -> HttpResponse<BoxBody> {
        let mut builder = HttpResponse::build(self.status_code());
        builder.insert_header((CONTENT_TYPE, PROBLEM_CONTENT_TYPE));
        for (name, value) in &self.headers {
            builder.insert_header((name.clone(), value.clone()));
        }
        builder.body(self.problem.to_json().to_string())
    }
}
