use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use crate::errors::Result;
use crate::io::http::{Clock, HttpClient, HttpRequest, HttpResponse};

/// Canned HTTP responses keyed by URL (query string ignored).
///
/// Responses registered for the same URL are served in order; the last one
/// repeats. Unknown URLs answer 404. Clones share state, so a test can keep a
/// handle to inspect requests after passing the client away.
#[derive(Clone, Default)]
pub struct FakeHttp {
    routes: Arc<RwLock<HashMap<String, VecDeque<HttpResponse>>>>,
    requests: Arc<Mutex<Vec<HttpRequest>>>,
}

impl FakeHttp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, url: &str, status: u16, body: &str) -> Self {
        self.respond_with_headers(url, status, body, &[])
    }

    pub fn respond_with_headers(
        self,
        url: &str,
        status: u16,
        body: &str,
        headers: &[(&str, &str)],
    ) -> Self {
        let response = HttpResponse {
            url: url.to_string(),
            status,
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_ascii_lowercase(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
            body: body.to_string(),
        };
        if let Ok(mut routes) = self.routes.write() {
            routes.entry(url.to_string()).or_default().push_back(response);
        }
        self
    }

    /// Every request served so far, in order.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn request_count(&self) -> usize {
        self.requests().len()
    }
}

impl HttpClient for FakeHttp {
    fn get(&self, request: &HttpRequest) -> Result<HttpResponse> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        let mut routes = match self.routes.write() {
            Ok(routes) => routes,
            Err(poisoned) => poisoned.into_inner(),
        };
        let response = match routes.get_mut(&request.url) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };
        Ok(response.unwrap_or_else(|| HttpResponse {
            url: request.url.clone(),
            status: 404,
            headers: BTreeMap::new(),
            body: String::new(),
        }))
    }
}

/// Clock that records sleeps and advances by them instead of blocking.
#[derive(Clone)]
pub struct FakeClock {
    now: Arc<Mutex<i64>>,
    sleeps: Arc<Mutex<Vec<Duration>>>,
}

impl FakeClock {
    pub fn at(epoch: i64) -> Self {
        Self {
            now: Arc::new(Mutex::new(epoch)),
            sleeps: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl Clock for FakeClock {
    fn now_epoch(&self) -> i64 {
        self.now.lock().map(|n| *n).unwrap_or_default()
    }

    fn sleep(&self, duration: Duration) {
        if let Ok(mut sleeps) = self.sleeps.lock() {
            sleeps.push(duration);
        }
        if let Ok(mut now) = self.now.lock() {
            *now += duration.as_secs() as i64;
        }
    }
}
