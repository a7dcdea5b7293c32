//! Listener registration statements generated for handler bindings.
//!
//! Single-method listener interfaces become lambdas; `TextWatcher` and
//! `AdapterView.OnItemSelectedListener` have several methods and become
//! anonymous classes.

use unbind_names::simple_type_name;

use crate::extract::{HandlerBinding, ListenerKind};

/// Render one listener-registration statement (no leading indent on the
/// first line; `indent` applies to continuation lines only).
pub fn listener_statement(handler: &HandlerBinding, target: &str, indent: &str) -> String {
    let m = handler.method_name.as_str();
    match handler.kind {
        ListenerKind::Click => format!(
            "{target}.setOnClickListener(v -> {});",
            call(handler, m, "v")
        ),
        ListenerKind::LongClick => format!(
            "{target}.setOnLongClickListener(v -> {});",
            call(handler, m, "v")
        ),
        ListenerKind::CheckedChanged => format!(
            "{target}.setOnCheckedChangeListener((view, isChecked) -> {});",
            call(handler, m, "view, isChecked")
        ),
        ListenerKind::Touch => format!(
            "{target}.setOnTouchListener((v, event) -> {});",
            call(handler, m, "v, event")
        ),
        ListenerKind::FocusChange => format!(
            "{target}.setOnFocusChangeListener((v, hasFocus) -> {});",
            call(handler, m, "v, hasFocus")
        ),
        ListenerKind::EditorAction => format!(
            "{target}.setOnEditorActionListener((v, actionId, event) -> {});",
            call(handler, m, "v, actionId, event")
        ),
        ListenerKind::ItemClick => format!(
            "{target}.setOnItemClickListener((parent, view, position, id) -> {});",
            call(handler, m, "parent, view, position, id")
        ),
        ListenerKind::TextChanged => text_watcher(handler, target, indent),
        ListenerKind::ItemSelected => item_selected(handler, target, indent),
    }
}

fn call(handler: &HandlerBinding, method: &str, args: &str) -> String {
    if handler.has_params {
        format!("{method}({args})")
    } else {
        format!("{method}()")
    }
}

// A handler taking `Editable` is fed from afterTextChanged; anything else
// (usually `CharSequence`) from onTextChanged.
fn text_watcher(handler: &HandlerBinding, target: &str, indent: &str) -> String {
    let after_route = handler
        .first_param_type
        .as_deref()
        .map(simple_type_name)
        .is_some_and(|t| t == "Editable");

    let on_text_call = if after_route {
        String::new()
    } else {
        format!(
            "\n{indent}        {};",
            call(handler, &handler.method_name, "s, start, before, count")
        )
    };
    let after_call = if after_route {
        format!("\n{indent}        {};", call(handler, &handler.method_name, "s"))
    } else {
        String::new()
    };

    format!(
        "{target}.addTextChangedListener(new TextWatcher() {{\n\
         {indent}    @Override\n\
         {indent}    public void beforeTextChanged(CharSequence s, int start, int count, int after) {{\n\
         {indent}    }}\n\
         \n\
         {indent}    @Override\n\
         {indent}    public void onTextChanged(CharSequence s, int start, int before, int count) {{{on_text_call}\n\
         {indent}    }}\n\
         \n\
         {indent}    @Override\n\
         {indent}    public void afterTextChanged(Editable s) {{{after_call}\n\
         {indent}    }}\n\
         {indent}}});"
    )
}

fn item_selected(handler: &HandlerBinding, target: &str, indent: &str) -> String {
    let selected_call = call(handler, &handler.method_name, "parent, view, position, id");
    format!(
        "{target}.setOnItemSelectedListener(new AdapterView.OnItemSelectedListener() {{\n\
         {indent}    @Override\n\
         {indent}    public void onItemSelected(AdapterView<?> parent, View view, int position, long id) {{\n\
         {indent}        {selected_call};\n\
         {indent}    }}\n\
         \n\
         {indent}    @Override\n\
         {indent}    public void onNothingSelected(AdapterView<?> parent) {{\n\
         {indent}    }}\n\
         {indent}}});"
    )
}
