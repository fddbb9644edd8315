//! JavaScript snippets for element queries.
//!
//! Every snippet is wrapped in `JSON.stringify` so the page always returns a
//! string, and is parsed on the Rust side. A snippet that addresses one
//! element returns `null` when that element is gone.

use tabsync::{DriverError, DriverResult, ElementRef, Locator};

/// Escape `s` as a JavaScript string literal.
pub(crate) fn quote(s: &str) -> DriverResult<String> {
    serde_json::to_string(s)
        .map_err(|e| DriverError::Command(format!("Failed to escape JS: {}", e)))
}

/// Expression evaluating to an array of the elements `locator` matches.
pub(crate) fn lookup(locator: &Locator) -> DriverResult<String> {
    match locator {
        Locator::XPath(expr) => Ok(format!(
            "(() => {{ const r = document.evaluate({}, document, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null); \
             const out = []; for (let i = 0; i < r.snapshotLength; i++) out.push(r.snapshotItem(i)); return out; }})()",
            quote(expr)?
        )),
        other => {
            let css = other
                .to_css()
                .ok_or_else(|| DriverError::Unsupported(format!("locator {}", other)))?;
            Ok(format!("Array.from(document.querySelectorAll({}))", quote(&css)?))
        }
    }
}

/// Number of matches.
pub(crate) fn count(locator: &Locator) -> DriverResult<String> {
    Ok(format!("JSON.stringify({}.length)", lookup(locator)?))
}

/// Run `body` with `el` bound to the referenced element.
pub(crate) fn on_element(element: &ElementRef, body: &str) -> DriverResult<String> {
    Ok(format!(
        "JSON.stringify((() => {{ const el = {}[{}]; if (!el) return null; {} }})())",
        lookup(&element.locator)?,
        element.index,
        body
    ))
}

pub(crate) const DISPLAYED: &str = "const s = window.getComputedStyle(el); \
     const r = el.getBoundingClientRect(); \
     return s.display !== 'none' && s.visibility !== 'hidden' && s.opacity !== '0' && (r.width > 0 || r.height > 0);";

pub(crate) const TEXT: &str = "return (el.innerText ?? el.textContent ?? '').trim();";

pub(crate) const CLICK: &str = "el.scrollIntoView({block: 'center'}); el.click(); return true;";

/// Wraps the attribute in an array so a missing attribute is not mistaken
/// for a missing element.
pub(crate) fn attribute(name: &str) -> DriverResult<String> {
    Ok(format!("return [el.getAttribute({})];", quote(name)?))
}

pub(crate) fn fill(value: &str) -> DriverResult<String> {
    Ok(format!(
        "el.focus(); el.value = {}; \
         el.dispatchEvent(new Event('input', {{bubbles: true}})); \
         el.dispatchEvent(new Event('change', {{bubbles: true}})); return true;",
        quote(value)?
    ))
}
