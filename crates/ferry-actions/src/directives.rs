use ferry_core::duration::DurationSpec;
use ferry_core::types::{Item, ParentOperation};

/// Resolve a duration directive. A usable value on the item wins over the parent's;
/// missing, empty or unparseable values yield `None`.
pub fn resolve_duration<P>(key: &str, item: &Item, parent: &P) -> Option<DurationSpec>
where
    P: ParentOperation + ?Sized,
{
    parse_directive(key, item.annotation(key), "item")
        .or_else(|| parse_directive(key, parent.annotation(key), parent.kind()))
}

fn parse_directive(key: &str, value: Option<&str>, source: &str) -> Option<DurationSpec> {
    let value = value.filter(|v| !v.is_empty())?;
    match value.parse::<DurationSpec>() {
        Ok(spec) => Some(spec),
        Err(e) => {
            tracing::warn!(annotation = key, source, "ignoring directive: {e}");
            None
        }
    }
}
