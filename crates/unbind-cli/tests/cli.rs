use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;

const BOUND_JAVA: &str = r#"
import butterknife.BindView;
import butterknife.ButterKnife;

public class CheckoutActivity extends AppCompatActivity {
    @BindView(R.id.username_input)
    EditText usernameInput;

    @Override
    protected void onCreate(Bundle savedInstanceState) {
        super.onCreate(savedInstanceState);
        setContentView(R.layout.activity_checkout_new);
        ButterKnife.bind(this);
    }
}
"#;

const PLAIN_JAVA: &str = r#"
public class Plain {
    void nothing() {}
}
"#;

const LAYOUT_XML: &str = r#"<LinearLayout xmlns:android="http://schemas.android.com/apk/res/android">
    <EditText android:id="@+id/username_input" />
</LinearLayout>
"#;

fn write(dir: &Path, rel: &str, contents: &str) {
    let path = dir.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

fn unbind() -> Command {
    Command::cargo_bin("unbind").unwrap()
}

#[test]
fn rewrites_a_project_directory() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "src/CheckoutActivity.java", BOUND_JAVA);
    write(dir.path(), "src/Plain.java", PLAIN_JAVA);
    write(dir.path(), "res/layout/activity_checkout_new.xml", LAYOUT_XML);

    unbind()
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("CheckoutActivity.java: rewritten"))
        .stdout(predicate::str::contains("Plain.java: unchanged"));

    let rewritten =
        fs::read_to_string(dir.path().join("src/CheckoutActivity.java")).unwrap();
    assert!(rewritten.contains("private ActivityCheckoutNewBinding binding;"));
    assert!(!rewritten.contains("butterknife"));

    // Untouched files stay byte-identical.
    let plain = fs::read_to_string(dir.path().join("src/Plain.java")).unwrap();
    assert_eq!(plain, PLAIN_JAVA);
}

#[test]
fn find_view_by_id_mode_via_flag() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "src/CheckoutActivity.java", BOUND_JAVA);
    write(dir.path(), "res/layout/activity_checkout_new.xml", LAYOUT_XML);

    unbind()
        .arg(dir.path())
        .args(["--mode", "find-view-by-id"])
        .assert()
        .success();

    let rewritten =
        fs::read_to_string(dir.path().join("src/CheckoutActivity.java")).unwrap();
    assert!(rewritten.contains("usernameInput = findViewById(R.id.username_input);"));
    assert!(!rewritten.contains("binding"));
}

#[test]
fn dry_run_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "src/CheckoutActivity.java", BOUND_JAVA);
    write(dir.path(), "res/layout/activity_checkout_new.xml", LAYOUT_XML);

    unbind()
        .arg(dir.path())
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(predicate::str::contains("would rewrite"));

    let untouched =
        fs::read_to_string(dir.path().join("src/CheckoutActivity.java")).unwrap();
    assert_eq!(untouched, BOUND_JAVA);
}

#[test]
fn single_file_with_explicit_project_root() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "src/CheckoutActivity.java", BOUND_JAVA);
    write(dir.path(), "res/layout/activity_checkout_new.xml", LAYOUT_XML);

    unbind()
        .arg(dir.path().join("src/CheckoutActivity.java"))
        .arg("--file-only")
        .arg("--project-root")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("rewritten"));
}

#[test]
fn json_output_carries_per_file_reports() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "src/CheckoutActivity.java", BOUND_JAVA);
    write(dir.path(), "res/layout/activity_checkout_new.xml", LAYOUT_XML);

    let output = unbind().arg(dir.path()).arg("--json").assert().success();
    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();

    let files = parsed["files"].as_array().unwrap();
    assert!(files
        .iter()
        .any(|f| f["changed"] == serde_json::Value::Bool(true)
            && f["layout"] == "activity_checkout_new"));
}

#[test]
fn missing_path_exits_with_two() {
    unbind()
        .arg("/nonexistent/place")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn file_only_rejects_directories() {
    let dir = tempfile::tempdir().unwrap();
    unbind()
        .arg(dir.path())
        .arg("--file-only")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--file-only"));
}
