//! Naming rules shared by the rewrite engine and the layout repairer.
//!
//! Three conventions meet here: snake_case resource ids (`login_button`),
//! camelCase binding fields (`loginButton`), and PascalCase generated
//! binding classes (`ActivityMainBinding`). The binding-class rule must be
//! bit-exact with the Android Gradle plugin's own generator — a mismatch
//! produces code referencing a class that does not exist.

/// Suffix the view-binding generator appends to every class name.
pub const BINDING_SUFFIX: &str = "Binding";

/// Fallback binding class when no layout name can be derived at all.
pub const FALLBACK_BINDING_CLASS: &str = "ActivityMainBinding";

/// Fallback used when a snake_case conversion is asked of an empty name.
pub const FALLBACK_LAYOUT_FRAGMENT: &str = "layout";

/// Convert a resource id to the field name the binding generator exposes.
///
/// Ids containing `_` are split and camel-cased; ids without a separator
/// are returned unchanged (the generator preserves their casing).
pub fn binding_field_name(resource_id: &str) -> String {
    if !resource_id.contains('_') {
        return resource_id.to_string();
    }

    let mut out = String::with_capacity(resource_id.len());
    for (i, segment) in resource_id.split('_').filter(|s| !s.is_empty()).enumerate() {
        if i == 0 {
            out.push_str(&segment.to_lowercase());
        } else {
            push_capitalized(&mut out, segment);
        }
    }
    out
}

/// Convert a layout name to its generated binding class name.
///
/// `activity_checkout_new` becomes `ActivityCheckoutNewBinding`. Empty or
/// unusable input falls back to [`FALLBACK_BINDING_CLASS`] rather than
/// failing.
pub fn binding_class_name(layout_name: &str) -> String {
    let mut out = String::with_capacity(layout_name.len() + BINDING_SUFFIX.len());
    for segment in layout_name.split('_').filter(|s| !s.is_empty()) {
        push_capitalized(&mut out, segment);
    }
    if out.is_empty() {
        return FALLBACK_BINDING_CLASS.to_string();
    }
    out.push_str(BINDING_SUFFIX);
    out
}

fn push_capitalized(out: &mut String, segment: &str) {
    let mut chars = segment.chars();
    if let Some(first) = chars.next() {
        out.extend(first.to_uppercase());
        out.push_str(&chars.as_str().to_lowercase());
    }
}

/// Guess the layout name for a class by its role suffix.
///
/// `CheckoutActivity` -> `activity_checkout`, `ProfileFragment` ->
/// `fragment_profile`; anything else converts whole with no prefix.
pub fn layout_name_for_class(class_name: &str) -> Option<String> {
    if class_name.is_empty() {
        return None;
    }

    if let Some(base) = class_name.strip_suffix("Activity") {
        if !base.is_empty() {
            return Some(format!("activity_{}", snake_case(base)));
        }
    }
    if let Some(base) = class_name.strip_suffix("Fragment") {
        if !base.is_empty() {
            return Some(format!("fragment_{}", snake_case(base)));
        }
    }
    Some(snake_case(class_name))
}

/// Convert camelCase/PascalCase to snake_case.
pub fn snake_case(name: &str) -> String {
    if name.is_empty() {
        return FALLBACK_LAYOUT_FRAGMENT.to_string();
    }

    let mut out = String::with_capacity(name.len() + 4);
    for (i, ch) in name.chars().enumerate() {
        if ch.is_uppercase() && i > 0 {
            out.push('_');
        }
        out.extend(ch.to_lowercase());
    }
    out
}

/// Short id prefix conventionally used for a view type (`Button` -> `btn`).
///
/// Matching is by lowercase substring so both `EditText` and
/// `androidx.appcompat.widget.AppCompatEditText` hit the `et` entry.
pub fn view_type_prefix(type_name: &str) -> &'static str {
    const TABLE: &[(&str, &str)] = &[
        ("button", "btn"),
        ("textview", "tv"),
        ("edittext", "et"),
        ("imageview", "iv"),
        ("recyclerview", "rv"),
        ("listview", "lv"),
        ("scrollview", "sv"),
        ("checkbox", "cb"),
        ("radiobutton", "rb"),
        ("switch", "sw"),
        ("spinner", "sp"),
        ("progressbar", "pb"),
        ("seekbar", "sb"),
        ("webview", "wv"),
        ("cardview", "cv"),
        ("toolbar", "tb"),
        ("layout", "layout"),
    ];

    let lowered = type_name.to_lowercase();
    for (needle, prefix) in TABLE {
        if lowered.contains(needle) {
            return prefix;
        }
    }
    "view"
}

/// Synthesized id for a layout's root element (`status_bar` -> `statusBarRoot`).
pub fn root_id_for_layout(layout_name: &str) -> String {
    let mut out = binding_field_name_lenient(layout_name);
    out.push_str("Root");
    out
}

// Like `binding_field_name` but lowercases a separator-free name's first
// segment, so synthesized root ids stay stable for odd inputs.
fn binding_field_name_lenient(layout_name: &str) -> String {
    if layout_name.is_empty() {
        return FALLBACK_LAYOUT_FRAGMENT.to_string();
    }
    if layout_name.contains('_') {
        binding_field_name(layout_name)
    } else {
        layout_name.to_lowercase()
    }
}

/// Role fragment used when synthesizing ids for untagged children.
pub fn element_role(tag_name: &str) -> &'static str {
    if tag_name.contains("Button") {
        "Button"
    } else if tag_name.contains("TextView") {
        "Text"
    } else if tag_name.contains("ImageView") {
        "Image"
    } else if tag_name.contains("LinearLayout") {
        "Linear"
    } else if tag_name.contains("RelativeLayout") {
        "Relative"
    } else if tag_name.contains("Layout") {
        "Layout"
    } else {
        "View"
    }
}

/// Whether `id` is a well-formed Android resource id name.
pub fn is_valid_resource_id(id: &str) -> bool {
    let mut chars = id.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    first.is_ascii_lowercase()
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Simple (unqualified) name of a Java type, stripping generics and arrays.
pub fn simple_type_name(raw: &str) -> String {
    let compact: String = raw.split_whitespace().collect();
    let mut no_generics = String::with_capacity(compact.len());
    let mut depth = 0u32;
    for ch in compact.chars() {
        match ch {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            _ if depth == 0 => no_generics.push(ch),
            _ => {}
        }
    }
    let no_array = no_generics.trim_end_matches("[]");
    no_array.rsplit('.').next().unwrap_or(no_array).to_string()
}
