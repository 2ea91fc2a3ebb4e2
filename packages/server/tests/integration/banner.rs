use chrono::{Local, Timelike};
use sea_orm::ConnectionTrait;
use serde_json::json;

use crate::common::{PNG_PIXEL, TestApp, routes};

/// `HH:MM` for the current local time shifted by `offset` minutes.
fn local_hhmm(offset: i32) -> String {
    let now = Local::now().time();
    let minutes = (now.hour() * 60 + now.minute()) as i32;
    let shifted = (minutes + offset).rem_euclid(24 * 60);
    format!("{:02}:{:02}", shifted / 60, shifted % 60)
}

/// Path portion of an absolute URL returned by the API.
fn path_of(url: &str) -> String {
    let rest = url.split_once("//").map(|(_, r)| r).unwrap_or(url);
    match rest.split_once('/') {
        Some((_, path)) => format!("/{path}"),
        None => "/".to_string(),
    }
}

#[tokio::test]
async fn lookup_requires_url_parameter() {
    let app = TestApp::spawn().await;

    let res = app.get("/api/v1/banners/lookup").await;
    assert_eq!(res.status, 400, "{}", res.text);
    assert_eq!(res.body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn lookup_unknown_url_returns_null() {
    let app = TestApp::spawn().await;

    let res = app.get(&routes::lookup("https://nowhere.example/")).await;
    assert_eq!(res.status, 200, "{}", res.text);
    assert_eq!(res.text, "null");
}

#[tokio::test]
async fn uploaded_banner_resolves_and_serves_its_image() {
    let app = TestApp::spawn().await;
    app.login().await;

    let page = "https://shop.example/product/42";
    let created = app.create_upload_banner(page, None).await;
    assert_eq!(created.status, 201, "{}", created.text);
    assert_eq!(created.body["image_type"], "upload");
    assert_eq!(created.body["active"], true);

    let res = app.get(&routes::lookup(page)).await;
    assert_eq!(res.status, 200, "{}", res.text);
    assert_eq!(res.body["id"], created.body["id"]);

    let image_url = res.body["image_url"].as_str().unwrap();
    assert!(
        image_url.contains("/api/v1/images/"),
        "unexpected image url: {image_url}"
    );

    let image = app.client.get(image_url).send().await.unwrap();
    assert_eq!(image.status(), 200);
    assert_eq!(
        image.headers()["content-type"].to_str().unwrap(),
        "image/png"
    );
    assert!(image.headers().contains_key("etag"));
    let bytes = image.bytes().await.unwrap();
    assert_eq!(&bytes[..], PNG_PIXEL);
}

#[tokio::test]
async fn image_etag_revalidation_returns_not_modified() {
    let app = TestApp::spawn().await;
    app.login().await;

    let created = app
        .create_upload_banner("https://shop.example/etag", None)
        .await;
    assert_eq!(created.status, 201, "{}", created.text);
    let image_url = created.body["image_url"].as_str().unwrap().to_string();

    let first = app.client.get(&image_url).send().await.unwrap();
    let etag = first.headers()["etag"].to_str().unwrap().to_string();

    let second = app
        .client
        .get(&image_url)
        .header("If-None-Match", &etag)
        .send()
        .await
        .unwrap();
    assert_eq!(second.status(), 304);
}

#[tokio::test]
async fn lookup_matches_the_exact_url_only() {
    let app = TestApp::spawn().await;
    app.login().await;

    let created = app
        .create_upload_banner("https://shop.example/product/1", None)
        .await;
    assert_eq!(created.status, 201, "{}", created.text);

    let other = app
        .get(&routes::lookup("https://shop.example/product/2"))
        .await;
    assert_eq!(other.status, 200);
    assert_eq!(other.text, "null");

    let prefix = app.get(&routes::lookup("https://shop.example/")).await;
    assert_eq!(prefix.text, "null");
}

#[tokio::test]
async fn new_banner_supersedes_the_previous_one() {
    let app = TestApp::spawn().await;
    app.login().await;

    let page = "https://shop.example/sale";
    let first = app.create_upload_banner(page, None).await;
    assert_eq!(first.status, 201, "{}", first.text);

    let second = app
        .create_external_banner(page, "https://cdn.example/v2.png")
        .await;
    assert_eq!(second.status, 201, "{}", second.text);

    let res = app.get(&routes::lookup(page)).await;
    assert_eq!(res.body["id"], second.body["id"]);

    let all = app.get(routes::BANNERS_ALL).await;
    assert_eq!(all.status, 200, "{}", all.text);
    assert_eq!(all.body["total"], 2);
    let active: Vec<_> = all.body["data"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|b| b["active"] == true)
        .collect();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0]["id"], second.body["id"]);
}

#[tokio::test]
async fn external_banner_keeps_its_image_url() {
    let app = TestApp::spawn().await;
    app.login().await;

    let page = "https://shop.example/partner";
    let created = app
        .create_external_banner(page, "https://cdn.example/banner.webp")
        .await;
    assert_eq!(created.status, 201, "{}", created.text);
    assert_eq!(created.body["image_type"], "url");

    let res = app.get(&routes::lookup(page)).await;
    assert_eq!(res.body["image_url"], "https://cdn.example/banner.webp");
}

#[tokio::test]
async fn toggle_deactivates_and_reactivates() {
    let app = TestApp::spawn().await;
    app.login().await;

    let page = "https://shop.example/toggle";
    let created = app.create_upload_banner(page, None).await;
    assert_eq!(created.status, 201, "{}", created.text);
    let id = created.id();

    let off = app
        .patch_json(routes::TOGGLE, &json!({ "id": id, "active": false }))
        .await;
    assert_eq!(off.status, 200, "{}", off.text);
    assert_eq!(off.body["active"], false);
    assert_eq!(app.get(&routes::lookup(page)).await.text, "null");

    let on = app
        .patch_json(routes::TOGGLE, &json!({ "id": id, "active": true }))
        .await;
    assert_eq!(on.status, 200, "{}", on.text);
    assert_eq!(app.get(&routes::lookup(page)).await.body["id"], id.as_str());
}

#[tokio::test]
async fn activating_a_banner_deactivates_its_siblings() {
    let app = TestApp::spawn().await;
    app.login().await;

    let page = "https://shop.example/siblings";
    let first = app.create_upload_banner(page, None).await;
    let second = app
        .create_external_banner(page, "https://cdn.example/v2.png")
        .await;
    assert_eq!(second.status, 201, "{}", second.text);

    let res = app
        .patch_json(
            routes::TOGGLE,
            &json!({ "id": first.id(), "active": true }),
        )
        .await;
    assert_eq!(res.status, 200, "{}", res.text);

    assert_eq!(
        app.get(&routes::lookup(page)).await.body["id"],
        first.body["id"]
    );

    let all = app.get(routes::BANNERS_ALL).await;
    let active: Vec<_> = all.body["data"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|b| b["active"] == true)
        .collect();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0]["id"], first.body["id"]);
}

#[tokio::test]
async fn toggle_unknown_banner_is_not_found() {
    let app = TestApp::spawn().await;
    app.login().await;

    let res = app
        .patch_json(
            routes::TOGGLE,
            &json!({ "id": uuid::Uuid::now_v7(), "active": true }),
        )
        .await;
    assert_eq!(res.status, 404, "{}", res.text);
    assert_eq!(res.body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn banner_outside_its_window_is_hidden() {
    let app = TestApp::spawn().await;
    app.login().await;

    let page = "https://shop.example/happy-hour";
    // A window starting an hour from now never covers the present moment,
    // wherever it falls relative to midnight.
    let created = app
        .create_upload_banner(page, Some((&local_hhmm(61), &local_hhmm(120))))
        .await;
    assert_eq!(created.status, 201, "{}", created.text);

    let res = app.get(&routes::lookup(page)).await;
    assert_eq!(res.status, 200, "{}", res.text);
    assert_eq!(res.text, "null");
}

#[tokio::test]
async fn banner_inside_its_window_is_served() {
    let app = TestApp::spawn().await;
    app.login().await;

    let page = "https://shop.example/lunch";
    let created = app
        .create_upload_banner(page, Some((&local_hhmm(-60), &local_hhmm(60))))
        .await;
    assert_eq!(created.status, 201, "{}", created.text);
    assert!(created.body["start_time"].is_string());

    let res = app.get(&routes::lookup(page)).await;
    assert_eq!(res.body["id"], created.body["id"]);
}

#[tokio::test]
async fn half_open_window_is_rejected() {
    let app = TestApp::spawn().await;
    app.login().await;

    let part = reqwest::multipart::Part::bytes(PNG_PIXEL.to_vec())
        .file_name("banner.png")
        .mime_str("image/png")
        .unwrap();
    let form = reqwest::multipart::Form::new()
        .text("url", "https://shop.example/")
        .text("image_type", "upload")
        .text("start_time", "08:00")
        .part("image", part);

    let res = app
        .client
        .post(app.url(routes::BANNERS))
        .multipart(form)
        .send()
        .await
        .unwrap();
    let res = crate::common::TestResponse::from_response(res).await;
    assert_eq!(res.status, 400, "{}", res.text);
    assert_eq!(res.body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn disallowed_image_content_type_is_rejected() {
    let app = TestApp::spawn().await;
    app.login().await;

    let part = reqwest::multipart::Part::bytes(b"<svg></svg>".to_vec())
        .file_name("banner.svg")
        .mime_str("image/svg+xml")
        .unwrap();
    let form = reqwest::multipart::Form::new()
        .text("url", "https://shop.example/")
        .text("image_type", "upload")
        .part("image", part);

    let res = app
        .client
        .post(app.url(routes::BANNERS))
        .multipart(form)
        .send()
        .await
        .unwrap();
    let res = crate::common::TestResponse::from_response(res).await;
    assert_eq!(res.status, 400, "{}", res.text);
}

#[tokio::test]
async fn create_rejects_non_http_destination() {
    let app = TestApp::spawn().await;
    app.login().await;

    let res = app.create_upload_banner("ftp://shop.example/", None).await;
    assert_eq!(res.status, 400, "{}", res.text);
    assert_eq!(res.body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn deleting_a_banner_removes_row_and_image() {
    let app = TestApp::spawn().await;
    app.login().await;

    let page = "https://shop.example/gone";
    let created = app.create_upload_banner(page, None).await;
    assert_eq!(created.status, 201, "{}", created.text);
    let image_path = path_of(created.body["image_url"].as_str().unwrap());

    let deleted = app.delete(&routes::banner(&created.id())).await;
    assert_eq!(deleted.status, 200, "{}", deleted.text);

    assert_eq!(app.get(&routes::lookup(page)).await.text, "null");

    let image = app.get(&image_path).await;
    assert_eq!(image.status, 404, "{}", image.text);

    let again = app.delete(&routes::banner(&created.id())).await;
    assert_eq!(again.status, 404, "{}", again.text);
}

#[tokio::test]
async fn deleting_one_banner_keeps_a_shared_image() {
    let app = TestApp::spawn().await;
    app.login().await;

    // Identical bytes dedup to one blob under content addressing.
    let first = app
        .create_upload_banner("https://shop.example/a", None)
        .await;
    let second = app
        .create_upload_banner("https://shop.example/b", None)
        .await;
    assert_eq!(second.status, 201, "{}", second.text);
    assert_eq!(first.body["image_url"], second.body["image_url"]);

    let deleted = app.delete(&routes::banner(&first.id())).await;
    assert_eq!(deleted.status, 200, "{}", deleted.text);

    let image_path = path_of(second.body["image_url"].as_str().unwrap());
    let image = app.get(&image_path).await;
    assert_eq!(image.status, 200, "image should survive: {}", image.text);
}

/// Simulate a database outage for the banner table.
async fn hide_banner_table(app: &TestApp) {
    app.db
        .execute_unprepared(r#"ALTER TABLE "banner" RENAME TO "banner_offline""#)
        .await
        .expect("Failed to hide banner table");
}

async fn restore_banner_table(app: &TestApp) {
    app.db
        .execute_unprepared(r#"ALTER TABLE "banner_offline" RENAME TO "banner""#)
        .await
        .expect("Failed to restore banner table");
}

#[tokio::test]
async fn failed_create_leaves_no_orphaned_blob() {
    let app = TestApp::spawn().await;
    app.login().await;

    hide_banner_table(&app).await;
    let res = app
        .create_upload_banner("https://shop.example/oops", None)
        .await;
    assert_eq!(res.status, 500, "{}", res.text);

    assert_eq!(app.stored_blob_count(), 0, "upload should be rolled back");
}

#[tokio::test]
async fn failed_create_keeps_a_blob_another_banner_shares() {
    let app = TestApp::spawn().await;
    app.login().await;

    let page = "https://shop.example/keep";
    let first = app.create_upload_banner(page, None).await;
    assert_eq!(first.status, 201, "{}", first.text);
    let image_path = path_of(first.body["image_url"].as_str().unwrap());

    // Identical bytes dedup to the first banner's blob; a failing create must
    // not take that blob down with it.
    hide_banner_table(&app).await;
    let failed = app
        .create_upload_banner("https://shop.example/other", None)
        .await;
    assert_eq!(failed.status, 500, "{}", failed.text);
    restore_banner_table(&app).await;

    let image = app.get(&image_path).await;
    assert_eq!(image.status, 200, "shared image should survive: {}", image.text);
    assert_eq!(
        app.get(&routes::lookup(page)).await.body["id"],
        first.body["id"]
    );
}

#[tokio::test]
async fn racing_creates_keep_one_banner_active() {
    let app = TestApp::spawn().await;
    app.login().await;

    let page = "https://shop.example/race";
    for round in 0..5 {
        let a = app.create_external_banner(page, "https://cdn.example/a.png");
        let b = app.create_external_banner(page, "https://cdn.example/b.png");
        let (a, b) = tokio::join!(a, b);

        // The loser of the activation race gets a conflict, never a second
        // active row.
        for res in [&a, &b] {
            assert!(
                res.status == 201 || res.status == 409,
                "round {round}: unexpected status {}: {}",
                res.status,
                res.text
            );
            if res.status == 409 {
                assert_eq!(res.body["code"], "CONFLICT");
            }
        }
        assert!(
            a.status == 201 || b.status == 201,
            "round {round}: no create succeeded"
        );

        let all = app.get(routes::BANNERS_ALL).await;
        let active = all.body["data"]
            .as_array()
            .unwrap()
            .iter()
            .filter(|banner| banner["url"] == page && banner["active"] == true)
            .count();
        assert_eq!(active, 1, "round {round}: exactly one banner must be active");
    }
}

#[tokio::test]
async fn configured_image_cap_governs_upload_size() {
    let app = TestApp::spawn_with_image_cap(20 * 1024 * 1024).await;
    app.login().await;

    let within = app
        .create_upload_banner_bytes("https://shop.example/big", vec![0u8; 18 * 1024 * 1024])
        .await;
    assert_eq!(within.status, 201, "{}", within.text);

    let over = app
        .create_upload_banner_bytes("https://shop.example/too-big", vec![0u8; 21 * 1024 * 1024])
        .await;
    assert_eq!(over.status, 400, "{}", over.text);
    assert_eq!(over.body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn lookup_allows_any_origin() {
    let app = TestApp::spawn().await;

    let res = app
        .client
        .get(app.url(&routes::lookup("https://anywhere.example/")))
        .header("Origin", "https://third-party.example")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 200);
    assert_eq!(
        res.headers()["access-control-allow-origin"]
            .to_str()
            .unwrap(),
        "*"
    );
}

#[tokio::test]
async fn embed_script_is_served_as_javascript() {
    let app = TestApp::spawn().await;

    let res = app.client.get(app.url("/embed.js")).send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert!(
        res.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("application/javascript")
    );
    let body = res.text().await.unwrap();
    assert!(body.contains("/api/v1/banners/lookup"));
}
