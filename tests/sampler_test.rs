// SPDX-License-Identifier: MIT
//! Workspace sampler integration tests over a realistic project tree.

use std::path::Path;
use tempfile::TempDir;

use vicod::config::SamplerConfig;
use vicod::sampler::sample_workspace;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

/// Lay down a small but representative web project.
fn scaffold(root: &Path) {
    write(
        root,
        "package.json",
        "{\n  \"name\": \"shop\",\n  \"scripts\": { \"dev\": \"vite\" }\n}\n",
    );
    write(
        root,
        "src/models/user.ts",
        "// the user record\nexport interface User {\n  id: string;\n  email: string;\n}\n",
    );
    write(
        root,
        "src/api/routes.ts",
        "export const routes = ['/login', '/cart'];\n",
    );
    write(
        root,
        "src/web/cart.ts",
        "export function addToCart(item) {\n  cart.push(item);\n  persist();\n}\n",
    );
    write(
        root,
        "src/web/checkout.ts",
        "export function checkout() {\n  pay();\n}\nexport const VAT = 0.2;\n",
    );
    // Noise that must never appear.
    write(root, "node_modules/lib/index.js", "LEAKED_DEP\n");
    write(root, ".env", "API_KEY=topsecret\n");
    write(root, "src/web/bundle.min.js", "LEAKED_MINIFIED\n");
    write(root, "assets/photo.png", "binary-ish\n");
}

#[tokio::test]
async fn sample_groups_by_folder_and_keeps_declarations() {
    let dir = TempDir::new().unwrap();
    scaffold(dir.path());

    let report = sample_workspace(dir.path(), &SamplerConfig::default())
        .await
        .unwrap();

    assert!(!report.truncated);
    assert!(report.folders >= 2);
    assert!(report.content.contains("// ===== Folder: src/models ====="));
    assert!(report.content.contains("// File: src/models/user.ts"));

    // models/user.ts matches the priority pattern: full body, comments gone.
    assert!(report.content.contains("email: string;"));
    assert!(!report.content.contains("the user record"));

    // web/cart.ts is a normal file: skeletonized to its declaration.
    assert!(report.content.contains("export function addToCart(item);"));
    assert!(!report.content.contains("cart.push"));
}

#[tokio::test]
async fn sample_never_leaks_excluded_or_sensitive_content() {
    let dir = TempDir::new().unwrap();
    scaffold(dir.path());

    let report = sample_workspace(dir.path(), &SamplerConfig::default())
        .await
        .unwrap();

    assert!(!report.content.contains("LEAKED_DEP"));
    assert!(!report.content.contains("LEAKED_MINIFIED"));
    assert!(!report.content.contains("topsecret"));
    assert!(report.files.iter().all(|f| !f.contains("node_modules")));
    assert!(report.files.iter().all(|f| !f.ends_with(".env")));
}

#[tokio::test]
async fn per_folder_cap_limits_selection() {
    let dir = TempDir::new().unwrap();
    for i in 0..6 {
        write(
            dir.path(),
            &format!("src/handlers/h{i}.ts"),
            &format!("export const h{i} = () => {i};\n"),
        );
    }

    let cfg = SamplerConfig {
        max_files_per_folder: 2,
        ..SamplerConfig::default()
    };
    let report = sample_workspace(dir.path(), &cfg).await.unwrap();
    assert_eq!(report.files.len(), 2);
}

#[tokio::test]
async fn tight_budget_truncates_and_stays_under_it() {
    let dir = TempDir::new().unwrap();
    scaffold(dir.path());

    let cfg = SamplerConfig {
        target_chars: 300,
        ..SamplerConfig::default()
    };
    let report = sample_workspace(dir.path(), &cfg).await.unwrap();
    assert!(report.truncated);
    assert!(report.content.len() <= 300);
    assert!(!report.files.is_empty());
}

#[tokio::test]
async fn missing_root_is_an_invalid_path_error() {
    let err = sample_workspace(Path::new("/no/such/workspace"), &SamplerConfig::default())
        .await
        .unwrap_err();
    assert!(err.to_string().starts_with("INVALID_PATH:"));
}

#[tokio::test]
async fn oversized_files_are_skipped() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "src/app/small.ts", "export const ok = 1;\n");
    write(
        dir.path(),
        "src/app/huge.ts",
        &format!("export const blob = \"{}\";\n", "x".repeat(5000)),
    );

    let cfg = SamplerConfig {
        max_file_bytes: 1024,
        ..SamplerConfig::default()
    };
    let report = sample_workspace(dir.path(), &cfg).await.unwrap();
    assert_eq!(report.files, vec!["src/app/small.ts".to_string()]);
}
