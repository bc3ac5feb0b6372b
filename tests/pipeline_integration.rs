use std::io::{Cursor, Write};
use std::sync::Arc;

use axum::{
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode},
};
use docmeta::{
    api,
    config::Config,
    document::{Document, MediaType},
    entities::EntityExtractor,
    extraction::{LopdfTextLayer, OcrPolicy, TextExtractor, UnavailableOcr, UnavailableRenderer},
    keywords::KeywordExtractor,
    processing::{EXTRACTION_FAILURE_MESSAGE, MetadataError, MetadataService},
    summarization::{MISSING_CREDENTIAL_MESSAGE, Summarizer, UNREACHABLE_MESSAGE},
};
use httpmock::{Method::POST, MockServer};
use lopdf::{Object, Stream, dictionary};
use serde_json::{Value, json};
use tower::ServiceExt;
use zip::{ZipWriter, write::SimpleFileOptions};

const PRESS_RELEASE: &str = "Apple Inc. announced a new product line in Paris, France. \
Tim Cook presented the product line to investors and said the product line ships next spring.";

const GENERATED_SUMMARY: &str =
    "**Title:** Apple product launch\n**Overview:** Apple announced a product line in Paris.";

fn config_for(api_url: &str, api_key: Option<&str>) -> Config {
    Config {
        gemini_api_url: api_url.to_string(),
        gemini_api_key: api_key.map(str::to_string),
        ..Config::default()
    }
}

/// Production extraction except PDF rendering and OCR, which need system libraries.
fn offline_extractor(config: &Config) -> TextExtractor {
    TextExtractor::new(
        Arc::new(LopdfTextLayer),
        Arc::new(UnavailableRenderer::new("not installed in tests")),
        Arc::new(UnavailableOcr::new("not installed in tests")),
        OcrPolicy {
            min_text_chars: config.ocr_min_text_chars,
            dpi: config.ocr_dpi,
        },
    )
}

fn service_for(config: &Config) -> MetadataService {
    MetadataService::new(
        offline_extractor(config),
        Summarizer::from_config(config),
        KeywordExtractor::from_config(config),
        EntityExtractor::from_config(config),
    )
}

fn text_document(text: &str) -> Document {
    Document::new("press.txt", MediaType::PlainText, text.as_bytes().to_vec())
}

fn docx(paragraphs: &[&str]) -> Vec<u8> {
    let body: String = paragraphs
        .iter()
        .map(|text| {
            if text.is_empty() {
                "<w:p/>".to_string()
            } else {
                format!("<w:p><w:r><w:t xml:space=\"preserve\">{text}</w:t></w:r></w:p>")
            }
        })
        .collect();
    let xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body}</w:body></w:document>"#
    );
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    writer
        .start_file("word/document.xml", SimpleFileOptions::default())
        .expect("start entry");
    writer.write_all(xml.as_bytes()).expect("write entry");
    writer.finish().expect("finish archive").into_inner()
}

fn pdf(pages: &[&str]) -> Vec<u8> {
    let mut doc = lopdf::Document::with_version("1.4");
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let pages_id = doc.new_object_id();
    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let content = format!("BT /F1 10 Tf 40 720 Td ({text}) Tj ET");
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Contents" => content_id,
            "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_id } },
        });
        kids.push(page_id.into());
    }
    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! { "Type" => "Pages", "Kids" => kids, "Count" => count }),
    );
    let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
    doc.trailer.set("Root", catalog_id);
    let mut buf = Vec::new();
    doc.save_to(&mut buf).expect("serialize pdf");
    buf
}

#[tokio::test]
async fn press_release_end_to_end() {
    let server = MockServer::start_async().await;
    let gemini = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1beta/models/gemini-2.0-flash:generateContent")
                .header("x-goog-api-key", "test-key")
                .body_contains("---BEGIN DOCUMENT TEXT---")
                .body_contains("Tim Cook");
            then.status(200).json_body(json!({
                "candidates": [{ "content": { "parts": [{ "text": GENERATED_SUMMARY }] } }]
            }));
        })
        .await;

    let service = service_for(&config_for(&server.base_url(), Some("test-key")));
    let record = service
        .build_metadata(text_document(PRESS_RELEASE))
        .await
        .expect("record");
    gemini.assert_async().await;

    assert_eq!(
        record.extracted_content.word_count,
        PRESS_RELEASE.split_whitespace().count()
    );
    assert_eq!(record.generated_metadata.summary.as_str(), GENERATED_SUMMARY);

    let entities = &record.generated_metadata.named_entities;
    assert!(entities.get("ORG").is_some_and(|orgs| orgs.iter().any(|o| o.contains("Apple"))));
    assert!(entities.get("GPE").is_some_and(|places| places.iter().any(|p| p == "Paris")));
    assert!(entities.get("PERSON").is_some_and(|people| people.iter().any(|p| p == "Tim Cook")));

    let keywords = &record.generated_metadata.keywords;
    assert!(
        keywords
            .iter()
            .any(|keyword| keyword.contains(' ') && PRESS_RELEASE.contains(keyword.as_str())),
        "no multi-word keyword in {keywords:?}"
    );
}

#[tokio::test]
async fn unreachable_summarizer_still_yields_full_record() {
    // Nothing listens on the discard port.
    let service = service_for(&config_for("http://127.0.0.1:9", Some("test-key")));
    let record = service
        .build_metadata(text_document(PRESS_RELEASE))
        .await
        .expect("record");

    assert_eq!(record.generated_metadata.summary.as_str(), UNREACHABLE_MESSAGE);
    assert!(!record.generated_metadata.keywords.is_empty());
    assert!(!record.generated_metadata.named_entities.is_empty());
    assert_eq!(service.metrics_snapshot().degraded_summaries, 1);
}

#[tokio::test]
async fn missing_credential_makes_no_network_calls() {
    let server = MockServer::start_async().await;
    let gemini = server
        .mock_async(|when, then| {
            when.method(POST);
            then.status(200);
        })
        .await;

    let service = service_for(&config_for(&server.base_url(), None));
    let record = service
        .build_metadata(text_document(PRESS_RELEASE))
        .await
        .expect("record");

    assert_eq!(record.generated_metadata.summary.as_str(), MISSING_CREDENTIAL_MESSAGE);
    gemini.assert_hits_async(0).await;
}

#[tokio::test]
async fn docx_paragraphs_are_joined_with_newlines() {
    let service = service_for(&config_for("http://127.0.0.1:9", None));
    let document = Document::new(
        "memo.docx",
        MediaType::Docx,
        docx(&["Quarterly Memo", "", "Revenue grew in Berlin."]),
    );

    let record = service.build_metadata(document).await.expect("record");

    let expected = "Quarterly Memo\n\nRevenue grew in Berlin.";
    assert_eq!(record.extracted_content.character_count, expected.chars().count());
    assert_eq!(record.extracted_content.word_count, 6);
    assert_eq!(
        record.generated_metadata.named_entities.get("GPE"),
        Some(&["Berlin".to_string()][..])
    );
}

#[tokio::test]
async fn text_layer_pdf_skips_ocr() {
    let config = config_for("http://127.0.0.1:9", None);
    let service = service_for(&config);
    let pages = [
        "The annual sustainability report covers renewable energy investments",
        "Wind farms in Spain and solar parks in Germany expanded capacity",
    ];
    let document = Document::new("report.pdf", MediaType::Pdf, pdf(&pages));

    let text = offline_extractor(&config).extract(&document);
    let first = text.find(pages[0]).expect("first page text");
    let second = text.find(pages[1]).expect("second page text");
    assert!(first < second, "pages out of order: {text:?}");

    let record = service.build_metadata(document).await.expect("record");

    let page_words: usize = pages.iter().map(|page| page.split_whitespace().count()).sum();
    assert_eq!(record.extracted_content.word_count, page_words);
    assert_eq!(service.metrics_snapshot().ocr_fallbacks, 0);
    assert_eq!(service.metrics_snapshot().documents_processed, 1);
}

#[tokio::test]
async fn scanned_pdf_without_ocr_engine_is_an_extraction_failure() {
    let service = service_for(&config_for("http://127.0.0.1:9", None));
    let document = Document::new("scan.pdf", MediaType::Pdf, pdf(&["", ""]));

    let error = service.build_metadata(document).await.expect_err("no text");

    assert!(matches!(error, MetadataError::ExtractionFailure));
    assert_eq!(service.metrics_snapshot().extraction_failures, 1);
}

#[tokio::test]
async fn http_upload_round_trip() {
    let service = Arc::new(service_for(&config_for("http://127.0.0.1:9", None)));
    let app = api::create_router_with_limit(service.clone(), 1024 * 1024);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/metadata")
                .header("content-type", "text/plain; charset=utf-8")
                .header("x-file-name", "press.txt")
                .body(Body::from(PRESS_RELEASE))
                .expect("request"),
        )
        .await
        .expect("router response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    let json: Value = serde_json::from_slice(&body).expect("json");
    assert_eq!(json["fileInfo"]["name"], "press.txt");
    assert_eq!(json["fileInfo"]["type"], "text/plain");
    assert_eq!(
        json["extractedContent"]["wordCount"],
        PRESS_RELEASE.split_whitespace().count()
    );
    assert_eq!(json["generatedMetadata"]["summary"], MISSING_CREDENTIAL_MESSAGE);
    assert!(json["processingStats"]["totalTime_s"].is_number());

    let response = app
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/metadata")
                .header("content-type", "text/plain")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("router response");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    let json: Value = serde_json::from_slice(&body).expect("json");
    assert_eq!(json["error"], EXTRACTION_FAILURE_MESSAGE);

    let snapshot = service.metrics_snapshot();
    assert_eq!(snapshot.documents_processed, 1);
    assert_eq!(snapshot.extraction_failures, 1);
}
