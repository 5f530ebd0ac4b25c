use std::cell::RefCell;
use std::rc::Rc;

use bytes::Bytes;
use lol_html::{element, HtmlRewriter, Settings};
use tracing::debug;

use crate::Extraction;

/// Tag/attribute pairs the tokenizer inspects for plain URL values.
const ATTR_SOURCES: &[(&str, &str)] = &[
    ("a", "href"),
    ("area", "href"),
    ("link", "href"),
    ("img", "src"),
    ("iframe", "src"),
    ("script", "src"),
    ("source", "src"),
    ("track", "src"),
    ("video", "src"),
    ("audio", "src"),
    ("video", "poster"),
    ("audio", "poster"),
    ("form", "action"),
];

/// Tags whose `srcset` holds a comma-separated candidate list.
const SRCSET_SOURCES: &[&str] = &["img", "source"];

/// Each srcset candidate is `<url> [descriptor]`; only the URL matters.
fn srcset_candidates(value: &str) -> impl Iterator<Item = &str> {
    value
        .split(',')
        .filter_map(|candidate| candidate.split_ascii_whitespace().next())
}

/// Run the streaming tokenizer over a sequence of byte chunks and collect
/// every URL the tag table yields, in document order.
///
/// The document is never buffered: each chunk is fed to the tokenizer and
/// dropped. Malformed markup never aborts the scan; the tokenizer keeps
/// whatever it extracted up to the point it gave up.
pub fn scan_html<I>(chunks: I) -> Extraction
where
    I: IntoIterator<Item = Bytes>,
{
    let sink = Rc::new(RefCell::new(Extraction::default()));

    let mut handlers = Vec::new();
    for &(tag, attr) in ATTR_SOURCES {
        let sink = Rc::clone(&sink);
        handlers.push(element!(format!("{tag}[{attr}]"), move |el| {
            if let Some(value) = el.get_attribute(attr) {
                sink.borrow_mut().links.push(value);
            }
            Ok(())
        }));
    }
    for &tag in SRCSET_SOURCES {
        let sink = Rc::clone(&sink);
        handlers.push(element!(format!("{tag}[srcset]"), move |el| {
            if let Some(value) = el.get_attribute("srcset") {
                sink.borrow_mut()
                    .links
                    .extend(srcset_candidates(&value).map(str::to_string));
            }
            Ok(())
        }));
    }
    {
        let sink = Rc::clone(&sink);
        handlers.push(element!("base[href]", move |el| {
            let mut out = sink.borrow_mut();
            // First base element wins, as in browsers.
            if out.base.is_none() {
                out.base = el.get_attribute("href");
            }
            Ok(())
        }));
    }

    let mut rewriter = HtmlRewriter::new(
        Settings {
            element_content_handlers: handlers,
            strict: false,
            ..Settings::default()
        },
        |_: &[u8]| {},
    );

    let mut stopped = false;
    for chunk in chunks {
        if let Err(e) = rewriter.write(&chunk) {
            debug!("html tokenizer stopped early: {e}");
            stopped = true;
            break;
        }
    }
    if stopped {
        drop(rewriter);
    } else if let Err(e) = rewriter.end() {
        debug!("html tokenizer finalization failed: {e}");
    }

    Rc::try_unwrap(sink)
        .map(RefCell::into_inner)
        .unwrap_or_default()
}
