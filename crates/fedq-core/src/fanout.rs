//! Parallel fetching of URL-valued attributes.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;
use std::thread;

use fedq_proto::{Action, Query, Value};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::connector::{Connector, QueryResult, SharedConnector};
use crate::error::Error;

/// Default bound on concurrent fetches.
pub const DEFAULT_MAX_WORKERS: usize = 16;

/// Retrieves the content behind a URL.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Value, String>;
}

impl<F> Fetcher for F
where
    F: Fn(&str) -> Result<Value, String> + Send + Sync,
{
    fn fetch(&self, url: &str) -> Result<Value, String> {
        self(url)
    }
}

/// Fetch every URL with at most `max_workers` threads.
///
/// Failures are recorded per URL and never abort the batch.
pub fn fetch_all<F: Fetcher + ?Sized>(
    fetcher: &F,
    urls: &BTreeSet<String>,
    max_workers: usize,
) -> BTreeMap<String, Result<Value, String>> {
    let queue: Mutex<VecDeque<&String>> = Mutex::new(urls.iter().collect());
    let results = Mutex::new(BTreeMap::new());
    let workers = max_workers.max(1).min(urls.len());

    thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| loop {
                let Some(url) = queue.lock().pop_front() else {
                    break;
                };
                let outcome = fetcher.fetch(url);
                if let Err(e) = &outcome {
                    warn!(url = %url, error = %e, "Fetch failed");
                }
                results.lock().insert(url.clone(), outcome);
            });
        }
    });

    results.into_inner()
}

fn is_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// Replaces URL attributes by the content they point to.
///
/// `mapping` goes from the attribute holding a URL to the attribute receiving
/// the fetched content. A failed fetch yields null.
pub struct EnrichConnector {
    child: SharedConnector,
    mapping: BTreeMap<String, String>,
    fetcher: Arc<dyn Fetcher>,
    max_workers: usize,
}

impl EnrichConnector {
    pub fn new<I, K, V>(child: SharedConnector, mapping: I, fetcher: Arc<dyn Fetcher>) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            child,
            mapping: mapping
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            fetcher,
            max_workers: DEFAULT_MAX_WORKERS,
        }
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    fn outputs(&self) -> BTreeSet<&String> {
        self.mapping.values().collect()
    }
}

impl Connector for EnrichConnector {
    fn name(&self) -> &str {
        "enrich"
    }

    fn query(&self, query: &Query) -> Result<QueryResult, Error> {
        if query.action != Action::Read {
            return Err(Error::unsupported_action(self.name(), query));
        }

        let outputs = self.outputs();
        let filter_attributes = query
            .filters
            .as_ref()
            .map(|p| p.attributes())
            .unwrap_or_default();
        let local_filter = filter_attributes.iter().any(|a| outputs.contains(&a));

        let wanted: Vec<(&String, &String)> = self
            .mapping
            .iter()
            .filter(|(_, out)| {
                query.selects_all()
                    || query.attributes.contains(*out)
                    || filter_attributes.contains(*out)
            })
            .collect();

        let mut child_query = query.clone();
        if !query.selects_all() {
            let mut attributes: BTreeSet<String> = query
                .attributes
                .iter()
                .chain(&filter_attributes)
                .filter(|a| !outputs.contains(a))
                .cloned()
                .collect();
            attributes.extend(wanted.iter().map(|(url, _)| (*url).clone()));
            child_query.attributes = attributes.into_iter().collect();
        }
        if local_filter {
            child_query.filters = None;
            child_query.offset = None;
            child_query.limit = None;
        }

        let mut entries = self.child.query_entries(&child_query)?;

        if !wanted.is_empty() {
            let urls: BTreeSet<String> = wanted
                .iter()
                .flat_map(|(url_attribute, _)| {
                    entries
                        .iter()
                        .filter_map(move |e| e.get(url_attribute.as_str()).and_then(|v| v.as_str()))
                })
                .filter(|url| is_url(url))
                .map(str::to_string)
                .collect();
            debug!(connector = self.name(), urls = urls.len(), "Fetching URLs");

            let fetched = fetch_all(self.fetcher.as_ref(), &urls, self.max_workers);
            for entry in &mut entries {
                for (url_attribute, output) in &wanted {
                    let Some(url) = entry.get(url_attribute.as_str()).and_then(|v| v.as_str()) else {
                        continue;
                    };
                    let content = match fetched.get(url) {
                        Some(Ok(value)) => value.clone(),
                        _ => Value::Null,
                    };
                    entry.insert(output.as_str(), content);
                }
            }
        }

        let entries = if local_filter {
            self.reshape(query, entries)
        } else {
            let projection = Query {
                attributes: query.attributes.clone(),
                ..Query::default()
            };
            self.reshape(&projection, entries)
        };
        Ok(QueryResult::Entries(entries))
    }

    fn attributes(&self, object: &str) -> BTreeSet<String> {
        let mut attributes = self.child.attributes(object);
        attributes.extend(self.mapping.values().cloned());
        attributes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entries::EntriesConnector;
    use fedq_proto::{Entry, Predicate};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn pages(url: &str) -> Result<Value, String> {
        match url.strip_prefix("https://example.org/") {
            Some("missing") => Err("404".to_string()),
            Some(page) => Ok(Value::from(format!("<{}>", page))),
            None => Err("bad host".to_string()),
        }
    }

    #[test]
    fn test_fetch_all_records_failures() {
        let urls: BTreeSet<String> = ["https://example.org/a", "https://example.org/missing"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let results = fetch_all(&pages, &urls, 4);
        assert_eq!(results.len(), 2);
        assert_eq!(results["https://example.org/a"], Ok(Value::from("<a>")));
        assert_eq!(results["https://example.org/missing"], Err("404".to_string()));
        assert!(fetch_all(&pages, &BTreeSet::new(), 4).is_empty());
    }

    #[test]
    fn test_fetch_all_bounds_concurrency() {
        let running = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        let fetcher = |_: &str| -> Result<Value, String> {
            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(5));
            running.fetch_sub(1, Ordering::SeqCst);
            Ok(Value::Null)
        };
        let urls: BTreeSet<String> = (0..20).map(|i| format!("https://example.org/{}", i)).collect();

        let results = fetch_all(&fetcher, &urls, 3);
        assert_eq!(results.len(), 20);
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    fn connector() -> EnrichConnector {
        let child: SharedConnector = Arc::new(EntriesConnector::new(vec![
            Entry::from([("id", Value::Int(1)), ("url", Value::from("https://example.org/a"))]),
            Entry::from([("id", Value::Int(2)), ("url", Value::from("https://example.org/missing"))]),
            Entry::from([("id", Value::Int(3)), ("url", Value::from("not a url"))]),
        ]));
        EnrichConnector::new(child, [("url", "content")], Arc::new(pages)).with_max_workers(2)
    }

    #[test]
    fn test_enrich_fills_outputs() {
        let result = connector()
            .query_entries(&Query::new().with_attributes(["id", "content"]))
            .unwrap();
        assert_eq!(
            result,
            vec![
                Entry::from([("id", Value::Int(1)), ("content", Value::from("<a>"))]),
                Entry::from([("id", Value::Int(2)), ("content", Value::Null)]),
                Entry::from([("id", Value::Int(3)), ("content", Value::Null)]),
            ]
        );
    }

    #[test]
    fn test_enrich_filters_on_fetched_content() {
        let result = connector()
            .query_entries(
                &Query::new()
                    .with_attributes(["id"])
                    .with_filter(Predicate::eq("content", "<a>")),
            )
            .unwrap();
        assert_eq!(result, vec![Entry::from([("id", 1)])]);
    }

    #[test]
    fn test_enrich_skips_fetch_when_not_requested() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let fetcher = move |url: &str| {
            counter.fetch_add(1, Ordering::SeqCst);
            pages(url)
        };
        let child: SharedConnector = Arc::new(EntriesConnector::new(vec![Entry::from([(
            "url",
            "https://example.org/a",
        )])]));
        let connector = EnrichConnector::new(child, [("url", "content")], Arc::new(fetcher));

        connector.query(&Query::new().with_attributes(["url"])).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            connector.attributes(""),
            BTreeSet::from(["content".to_string(), "url".to_string()])
        );
    }
}
