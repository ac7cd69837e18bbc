use once_cell::sync::Lazy;
use rustc_hash::FxHashSet;

/// Globals provided by the JavaScript language, the browser, and the
/// mini-program runtime shipped next to every bundle.
static BUILTIN_GLOBALS: Lazy<FxHashSet<&'static str>> = Lazy::new(|| {
    [
        // Language
        "undefined",
        "NaN",
        "Infinity",
        "globalThis",
        "Object",
        "Function",
        "Array",
        "Number",
        "Boolean",
        "String",
        "Symbol",
        "BigInt",
        "Math",
        "JSON",
        "Date",
        "RegExp",
        "Error",
        "TypeError",
        "RangeError",
        "SyntaxError",
        "ReferenceError",
        "EvalError",
        "URIError",
        "AggregateError",
        "Promise",
        "Proxy",
        "Reflect",
        "Map",
        "Set",
        "WeakMap",
        "WeakSet",
        "WeakRef",
        "ArrayBuffer",
        "SharedArrayBuffer",
        "DataView",
        "Int8Array",
        "Uint8Array",
        "Uint8ClampedArray",
        "Int16Array",
        "Uint16Array",
        "Int32Array",
        "Uint32Array",
        "Float32Array",
        "Float64Array",
        "BigInt64Array",
        "BigUint64Array",
        "Intl",
        "parseInt",
        "parseFloat",
        "isNaN",
        "isFinite",
        "encodeURI",
        "encodeURIComponent",
        "decodeURI",
        "decodeURIComponent",
        "eval",
        "arguments",
        // Host
        "console",
        "window",
        "document",
        "navigator",
        "location",
        "history",
        "localStorage",
        "sessionStorage",
        "fetch",
        "setTimeout",
        "clearTimeout",
        "setInterval",
        "clearInterval",
        "requestAnimationFrame",
        "cancelAnimationFrame",
        "queueMicrotask",
        "URL",
        "URLSearchParams",
        "TextEncoder",
        "TextDecoder",
        "performance",
        "alert",
        // Mini-program runtime
        "wx",
        "App",
        "Page",
        "Component",
        "Behavior",
        "getApp",
        "getCurrentPages",
        "remotes",
    ]
    .into_iter()
    .collect()
});

/// Check whether a name is a builtin global.
pub fn is_builtin_global(name: &str) -> bool {
    BUILTIN_GLOBALS.contains(name)
}

/// Set of free names that resolve without a local definition or an import.
#[derive(Debug, Clone, Default)]
pub struct KnownGlobals {
    extra: FxHashSet<String>,
}

impl KnownGlobals {
    /// Builtins plus user-declared globals.
    pub fn with_extra<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            extra: extra.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        is_builtin_global(name) || self.extra.contains(name)
    }
}
