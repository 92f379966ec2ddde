//! In-page JavaScript used by the browser backend.
//!
//! Locator expressions are embedded as JSON string literals, so quotes and
//! backslashes in selectors never break out of the script.

use gleaner_core::profile::Locator;

/// JS expression evaluating to the first node matching `locator`, or `null`.
pub fn node_expr(locator: &Locator) -> String {
    let literal = js_string(locator.expression());
    match locator {
        Locator::Css(_) => format!("document.querySelector({literal})"),
        Locator::XPath(_) => format!(
            "document.evaluate({literal}, document, null, \
             XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue"
        ),
    }
}

/// Script returning `true` once `locator` matches a node.
pub fn exists_script(locator: &Locator) -> String {
    format!("(() => {{ try {{ return {} !== null; }} catch (e) {{ return false; }} }})()", node_expr(locator))
}

/// Script returning one trimmed text (or `null`) per locator, in order.
pub fn read_texts_script(locators: &[&Locator]) -> String {
    let picks: Vec<String> = locators
        .iter()
        .map(|locator| format!("pick(() => {})", node_expr(locator)))
        .collect();

    format!(
        "(() => {{\n\
         const pick = (find) => {{\n\
           let node = null;\n\
           try {{ node = find(); }} catch (e) {{ return null; }}\n\
           if (node === null) return null;\n\
           const text = node.innerText ?? node.textContent ?? '';\n\
           return text.trim();\n\
         }};\n\
         return [{}];\n\
         }})()",
        picks.join(", ")
    )
}

fn js_string(value: &str) -> String {
    // Serializing a str cannot fail.
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}
