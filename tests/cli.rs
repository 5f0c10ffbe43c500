use assert_cmd::Command;
use image::{Rgba, RgbaImage};
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn bin() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("phantom"));
    cmd.env_remove("PHANTOM_LOG");
    cmd
}

fn encode(text: &str, password: &str) -> String {
    let output = bin()
        .env("PHANTOM_PASSWORD", password)
        .arg("encode")
        .arg(text)
        .output()
        .unwrap();

    assert!(output.status.success());
    String::from_utf8(output.stdout).unwrap()
}

fn write_carrier(path: &Path, width: u32, height: u32) {
    RgbaImage::from_pixel(width, height, Rgba([40, 80, 120, 255]))
        .save(path)
        .unwrap();
}

#[test]
fn encode_prints_a_secure_block() {
    bin()
        .env("PHANTOM_PASSWORD", "pw")
        .arg("encode")
        .arg("Hello World!")
        .assert()
        .success()
        .stdout(predicate::str::starts_with(
            "--- PHANTOM SECURE BLOCK REVISION 1 ---",
        ))
        .stdout(predicate::str::contains("--- END OF SECURE BLOCK ---"));
}

#[test]
fn encode_and_decode_roundtrip() {
    let dir = tempdir().unwrap();
    let block_path = dir.path().join("block.txt");

    bin()
        .env("PHANTOM_PASSWORD", "password123")
        .arg("encode")
        .arg("Hello World!")
        .arg("--output")
        .arg(&block_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("secure block written"));

    bin()
        .env("PHANTOM_PASSWORD", "password123")
        .arg("decode")
        .arg("--input")
        .arg(&block_path)
        .assert()
        .success()
        .stdout("Hello World!\n");
}

#[test]
fn decode_accepts_block_as_argument() {
    let block = encode("inline", "pw");

    bin()
        .env("PHANTOM_PASSWORD", "pw")
        .arg("decode")
        .arg(&block)
        .assert()
        .success()
        .stdout("inline\n");
}

#[test]
fn decode_accepts_block_pasted_inside_a_message() {
    let block = encode("wrapped in chatter", "pw");
    let pasted = format!("Hi, here is the note:\r\n\r\n{}\r\nCheers", block.trim_end());

    bin()
        .env("PHANTOM_PASSWORD", "pw")
        .arg("decode")
        .arg(&pasted)
        .assert()
        .success()
        .stdout("wrapped in chatter\n");
}

#[test]
fn decode_with_wrong_password_fails() {
    let block = encode("secret", "password123");

    bin()
        .env("PHANTOM_PASSWORD", "wrongpass")
        .arg("decode")
        .arg(&block)
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "decryption failed: wrong password or tampered data",
        ));
}

#[test]
fn decode_rejects_text_that_is_not_a_block() {
    bin()
        .env("PHANTOM_PASSWORD", "pw")
        .arg("decode")
        .arg("just some text")
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid secure block"));
}

#[test]
fn empty_password_is_rejected() {
    bin()
        .env("PHANTOM_PASSWORD", "")
        .arg("encode")
        .arg("text")
        .write_stdin("\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("password cannot be empty"));
}

#[test]
fn password_can_be_piped() {
    let block = encode("piped", "from-stdin");

    bin()
        .env_remove("PHANTOM_PASSWORD")
        .arg("decode")
        .arg(&block)
        .write_stdin("from-stdin\n")
        .assert()
        .success()
        .stdout("piped\n");
}

#[test]
fn existing_output_is_not_overwritten_without_force() {
    let dir = tempdir().unwrap();
    let block_path = dir.path().join("block.txt");
    fs::write(&block_path, "keep me").unwrap();

    bin()
        .env("PHANTOM_PASSWORD", "pw")
        .arg("encode")
        .arg("text")
        .arg("--output")
        .arg(&block_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));

    assert_eq!(fs::read_to_string(&block_path).unwrap(), "keep me");

    bin()
        .env("PHANTOM_PASSWORD", "pw")
        .arg("encode")
        .arg("text")
        .arg("--output")
        .arg(&block_path)
        .arg("--force")
        .assert()
        .success();

    assert!(fs::read_to_string(&block_path)
        .unwrap()
        .starts_with("--- PHANTOM SECURE BLOCK"));
}

#[test]
fn file_payload_is_restored_under_its_name() {
    let src = tempdir().unwrap();
    let dst = tempdir().unwrap();
    let file_path = src.path().join("report.bin");
    let block_path = src.path().join("block.txt");
    fs::write(&file_path, [0u8, 1, 2, 254, 255]).unwrap();

    bin()
        .env("PHANTOM_PASSWORD", "pw")
        .arg("encode")
        .arg("--file")
        .arg(&file_path)
        .arg("--mime")
        .arg("application/x-report")
        .arg("--output")
        .arg(&block_path)
        .assert()
        .success();

    bin()
        .current_dir(dst.path())
        .env("PHANTOM_PASSWORD", "pw")
        .arg("decode")
        .arg("--input")
        .arg(&block_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("report.bin"))
        .stdout(predicate::str::contains("application/x-report"));

    assert_eq!(
        fs::read(dst.path().join("report.bin")).unwrap(),
        [0u8, 1, 2, 254, 255]
    );
}

#[test]
fn hide_and_reveal_encrypted_message() {
    let dir = tempdir().unwrap();
    let carrier = dir.path().join("carrier.png");
    let stego = dir.path().join("stego.png");
    write_carrier(&carrier, 100, 100);

    bin()
        .env("PHANTOM_PASSWORD", "pw")
        .arg("hide")
        .arg("--carrier")
        .arg(&carrier)
        .arg("--output")
        .arg(&stego)
        .arg("meet at dawn")
        .assert()
        .success();

    bin()
        .env("PHANTOM_PASSWORD", "pw")
        .arg("reveal")
        .arg("--carrier")
        .arg(&stego)
        .assert()
        .success()
        .stdout("meet at dawn\n");

    bin()
        .arg("reveal")
        .arg("--carrier")
        .arg(&stego)
        .arg("--raw")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("--- PHANTOM SECURE BLOCK"));
}

#[test]
fn hide_and_reveal_raw_message() {
    let dir = tempdir().unwrap();
    let carrier = dir.path().join("carrier.png");
    let stego = dir.path().join("stego.png");
    write_carrier(&carrier, 20, 20);

    bin()
        .arg("hide")
        .arg("--raw")
        .arg("--carrier")
        .arg(&carrier)
        .arg("--output")
        .arg(&stego)
        .arg("plain")
        .assert()
        .success();

    bin()
        .arg("reveal")
        .arg("--carrier")
        .arg(&stego)
        .assert()
        .success()
        .stdout("plain\n");
}

#[test]
fn hide_fails_when_carrier_is_too_small() {
    let dir = tempdir().unwrap();
    let carrier = dir.path().join("tiny.png");
    let stego = dir.path().join("stego.png");
    write_carrier(&carrier, 2, 2);

    bin()
        .env("PHANTOM_PASSWORD", "pw")
        .arg("hide")
        .arg("--carrier")
        .arg(&carrier)
        .arg("--output")
        .arg(&stego)
        .arg("does not fit")
        .assert()
        .failure()
        .stderr(predicate::str::contains("carrier too small"));

    assert!(!stego.exists());
}

#[test]
fn reveal_on_pristine_image_finds_nothing() {
    let dir = tempdir().unwrap();
    let carrier = dir.path().join("carrier.png");
    write_carrier(&carrier, 10, 10);

    bin()
        .arg("reveal")
        .arg("--carrier")
        .arg(&carrier)
        .assert()
        .failure()
        .stderr(predicate::str::contains("no hidden payload"));
}

#[test]
fn capacity_reports_raw_and_encrypted_sizes() {
    let dir = tempdir().unwrap();
    let carrier = dir.path().join("carrier.png");
    write_carrier(&carrier, 500, 500);

    bin()
        .arg("capacity")
        .arg("--carrier")
        .arg(&carrier)
        .assert()
        .success()
        .stdout(predicate::str::contains("500x500"))
        .stdout(predicate::str::contains("raw capacity:       31235 bytes"));
}

#[test]
fn batch_returns_results_in_input_order() {
    let block = encode("from batch", "pw");
    let input = format!(
        "{}\n{}\n{}\nnot json\n",
        serde_json::json!({"operation": "encode", "payload": "first", "password": "a"}),
        serde_json::json!({"operation": "decode", "payload": block, "password": "pw"}),
        serde_json::json!({"operation": "decode", "payload": block, "password": "bad"}),
    );

    let output = bin().arg("batch").write_stdin(input).output().unwrap();
    assert!(output.status.success());

    let lines: Vec<serde_json::Value> = String::from_utf8(output.stdout)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    assert_eq!(lines.len(), 4);
    for (i, line) in lines.iter().enumerate() {
        assert_eq!(line["index"], i);
    }

    assert_eq!(lines[0]["success"], true);
    assert!(lines[0]["result"]
        .as_str()
        .unwrap()
        .starts_with("--- PHANTOM SECURE BLOCK"));

    assert_eq!(lines[1]["success"], true);
    assert_eq!(lines[1]["result"], "from batch");

    assert_eq!(lines[2]["success"], false);
    assert!(lines[2]["error"]
        .as_str()
        .unwrap()
        .contains("wrong password"));

    assert_eq!(lines[3]["success"], false);
    assert!(lines[3]["error"].as_str().unwrap().starts_with("invalid job"));
}
