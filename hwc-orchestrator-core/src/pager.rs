//! Paginated collection fetching
//!
//! Both listing idioms of the control plane (`offset`/`limit` and
//! `page_number`/`page_size`) are driven by [`PagerConfig`]; the caller only
//! supplies how to fetch the page at a cursor.

use std::future::Future;

use futures::stream::{self, Stream, TryStreamExt};

use hwc_orchestrator_provider::{Page, PageCursor, PagerConfig};

/// Lazily fetch every item of a listing, in page order.
///
/// Stops after a page flagged as the end, after an empty page, or (offset
/// listings) after a page shorter than the limit. A page of exactly `limit`
/// items costs one more request. A page error is yielded and ends the stream.
pub fn fetch<T, E, F, Fut>(config: PagerConfig, page_fn: F) -> impl Stream<Item = Result<T, E>>
where
    F: FnMut(PageCursor) -> Fut,
    Fut: Future<Output = Result<Page<T>, E>>,
{
    stream::try_unfold(
        (Some(config.first_cursor()), page_fn),
        move |(cursor, mut page_fn)| async move {
            let Some(cursor) = cursor else {
                return Ok(None);
            };
            let page = page_fn(cursor).await?;
            let next = if page.end {
                None
            } else {
                config.next_cursor(cursor, page.items.len())
            };
            log::debug!("fetched {} item(s) at {cursor:?}", page.items.len());
            Ok(Some((page.items, (next, page_fn))))
        },
    )
    .map_ok(|items| stream::iter(items.into_iter().map(Ok)))
    .try_flatten()
}

/// Drain [`fetch`] into a vector.
pub async fn fetch_all<T, E, F, Fut>(config: PagerConfig, page_fn: F) -> Result<Vec<T>, E>
where
    F: FnMut(PageCursor) -> Fut,
    Fut: Future<Output = Result<Page<T>, E>>,
{
    fetch(config, page_fn).try_collect().await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::StreamExt;

    use super::*;

    const OFFSET: PagerConfig = PagerConfig::OffsetLimit { start: 0, limit: 2 };
    const NUMBERED: PagerConfig = PagerConfig::PageNumber {
        first_page: 1,
        page_size: 2,
    };

    /// Serve `pages` in order, counting requests. Beyond the script: empty pages.
    fn pages(
        pages: Vec<Vec<u32>>,
    ) -> (
        Arc<AtomicUsize>,
        impl FnMut(PageCursor) -> futures::future::Ready<Result<Page<u32>, String>>,
    ) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let page_fn = move |_cursor: PageCursor| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            futures::future::ready(Ok(Page::new(pages.get(n).cloned().unwrap_or_default())))
        };
        (calls, page_fn)
    }

    #[tokio::test]
    async fn offset_concatenates_and_stops_on_short_page() {
        let (calls, page_fn) = pages(vec![vec![1, 2], vec![3, 4], vec![5]]);
        let items = fetch_all(OFFSET, page_fn).await.unwrap();
        assert_eq!(items, vec![1, 2, 3, 4, 5]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exact_limit_costs_one_more_request() {
        let (calls, page_fn) = pages(vec![vec![1, 2], vec![3, 4]]);
        let items = fetch_all(OFFSET, page_fn).await.unwrap();
        assert_eq!(items, vec![1, 2, 3, 4]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn empty_first_page_yields_nothing() {
        let (calls, page_fn) = pages(vec![]);
        assert!(fetch_all(NUMBERED, page_fn).await.unwrap().is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn page_number_continues_past_short_pages() {
        let (calls, page_fn) = pages(vec![vec![1, 2], vec![3], vec![4]]);
        let items = fetch_all(NUMBERED, page_fn).await.unwrap();
        assert_eq!(items, vec![1, 2, 3, 4]);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn explicit_end_marker_stops() {
        let mut served = 0;
        let page_fn = |_cursor: PageCursor| {
            served += 1;
            futures::future::ready(Ok::<_, String>(Page::last(vec![7, 8])))
        };
        let items = fetch_all(NUMBERED, page_fn).await.unwrap();
        assert_eq!(items, vec![7, 8]);
        assert_eq!(served, 1);
    }

    #[tokio::test]
    async fn cursors_advance() {
        let mut seen = Vec::new();
        let page_fn = |cursor: PageCursor| {
            seen.push(cursor);
            let items = if seen.len() < 3 { vec![0, 0] } else { vec![] };
            futures::future::ready(Ok::<_, String>(Page::new(items)))
        };
        fetch_all(OFFSET, page_fn).await.unwrap();
        assert_eq!(
            seen,
            vec![
                PageCursor::Offset { offset: 0, limit: 2 },
                PageCursor::Offset { offset: 2, limit: 2 },
                PageCursor::Offset { offset: 4, limit: 2 },
            ]
        );
    }

    #[tokio::test]
    async fn error_is_yielded_then_stream_ends() {
        let mut n = 0;
        let page_fn = |_cursor: PageCursor| {
            n += 1;
            futures::future::ready(if n == 1 {
                Ok(Page::new(vec![1, 2]))
            } else {
                Err("HTTP 500".to_string())
            })
        };
        let results: Vec<_> = fetch(OFFSET, page_fn).collect().await;
        assert_eq!(
            results,
            vec![Ok(1), Ok(2), Err("HTTP 500".to_string())]
        );
    }

    #[tokio::test]
    async fn stream_is_lazy() {
        let (calls, page_fn) = pages(vec![vec![1, 2], vec![3, 4]]);
        let stream = fetch(OFFSET, page_fn);
        futures::pin_mut!(stream);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(stream.next().await, Some(Ok(1)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
