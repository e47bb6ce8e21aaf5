//! Argument completion shared by resource templates and prompts.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::sync::Arc;

use crate::protocol::{ CompleteArgument, CompleteResult, CompletionInfo, Error };

/// Most values returned by a single completion
pub const MAX_COMPLETION_VALUES: usize = 100;

pub type CompletionFuture = BoxFuture<'static, Result<Vec<String>, Error>>;

/// Produces candidate values for a partially typed argument
pub type CompletionHandler = Arc<dyn (Fn(CompleteArgument) -> CompletionFuture) + Send + Sync>;

/// Box an async function as a `CompletionHandler`
pub fn completion_handler<F, Fut>(handler: F) -> CompletionHandler
    where
        F: Fn(CompleteArgument) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<String>, Error>> + Send + 'static
{
    Arc::new(move |argument: CompleteArgument| handler(argument).boxed())
}

/// Complete against a fixed list of candidates by prefix
pub fn prefix_completion<I, S>(candidates: I, ignore_case: bool) -> CompletionHandler
    where I: IntoIterator<Item = S>, S: Into<String>
{
    let candidates: Arc<Vec<String>> = Arc::new(candidates.into_iter().map(Into::into).collect());
    completion_handler(move |argument| {
        let candidates = candidates.clone();
        async move {
            let matches = candidates
                .iter()
                .filter(|candidate| {
                    if ignore_case {
                        candidate.to_lowercase().starts_with(&argument.value.to_lowercase())
                    } else {
                        candidate.starts_with(&argument.value)
                    }
                })
                .cloned()
                .collect();
            Ok(matches)
        }
    })
}

/// Cap the values at `MAX_COMPLETION_VALUES`, flagging truncation
pub fn completion_result(mut values: Vec<String>) -> CompleteResult {
    let total = values.len();
    let has_more = total > MAX_COMPLETION_VALUES;
    values.truncate(MAX_COMPLETION_VALUES);

    CompleteResult {
        completion: CompletionInfo {
            values,
            total: Some(total as i64),
            has_more: Some(has_more),
        },
    }
}

/// Run `handler` if there is one; no handler completes to nothing
pub async fn complete_with(
    handler: Option<CompletionHandler>,
    argument: CompleteArgument
) -> Result<CompleteResult, Error> {
    match handler {
        Some(handler) => Ok(completion_result(handler(argument).await?)),
        None => Ok(completion_result(Vec::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argument(value: &str) -> CompleteArgument {
        CompleteArgument {
            name: "key".to_string(),
            value: value.to_string(),
        }
    }

    #[tokio::test]
    async fn test_prefix_completion() {
        let handler = prefix_completion(["asdf", "zxcv"], false);
        let result = complete_with(Some(handler), argument("a")).await.unwrap();
        assert_eq!(result.completion.values, vec!["asdf"]);
        assert_eq!(result.completion.has_more, Some(false));
    }

    #[tokio::test]
    async fn test_prefix_completion_ignoring_case() {
        let handler = prefix_completion(["James", "Josh"], true);
        let result = complete_with(Some(handler), argument("j")).await.unwrap();
        assert_eq!(result.completion.values, vec!["James", "Josh"]);
    }

    #[tokio::test]
    async fn test_missing_handler_is_empty() {
        let result = complete_with(None, argument("a")).await.unwrap();
        assert!(result.completion.values.is_empty());
    }

    #[test]
    fn test_results_are_capped() {
        let values = (0..150).map(|i| i.to_string()).collect();
        let result = completion_result(values);
        assert_eq!(result.completion.values.len(), MAX_COMPLETION_VALUES);
        assert_eq!(result.completion.total, Some(150));
        assert_eq!(result.completion.has_more, Some(true));
    }
}
