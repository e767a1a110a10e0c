//! 单元测试共用的图片构造工具。

use image::{DynamicImage, ImageBuffer, ImageFormat, Rgba, RgbaImage};
use std::io::{Cursor, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread::{self, JoinHandle};

use super::geometry::{Dimensions, Orientation};
use super::source::ProcessedImage;

pub(crate) fn gradient(width: u32, height: u32) -> RgbaImage {
    ImageBuffer::from_fn(width, height, |x, y| {
        let r = (x % 255) as u8;
        let g = (y % 255) as u8;
        let b = ((x + y) % 255) as u8;
        Rgba([r, g, b, 255])
    })
}

fn encode(image: DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    image
        .write_to(&mut cursor, format)
        .expect("failed to encode test image");
    cursor.into_inner()
}

pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    encode(DynamicImage::ImageRgba8(gradient(width, height)), ImageFormat::Png)
}

pub(crate) fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let rgb = DynamicImage::ImageRgba8(gradient(width, height)).to_rgb8();
    encode(DynamicImage::ImageRgb8(rgb), ImageFormat::Jpeg)
}

/// 在 SOI 之后插入只含 Orientation 字段（SHORT）的 APP1 段。
pub(crate) fn with_orientation(jpeg: &[u8], code: u16) -> Vec<u8> {
    let [hi, lo] = code.to_be_bytes();
    with_orientation_entry(jpeg, 3, 1, [hi, lo, 0, 0])
}

/// 同上，但可指定字段类型、个数与内联的 4 字节值。
pub(crate) fn with_orientation_entry(jpeg: &[u8], field_type: u16, count: u32, value: [u8; 4]) -> Vec<u8> {
    assert_eq!(&jpeg[..2], &[0xFF, 0xD8], "not a jpeg");

    let mut tiff = Vec::new();
    tiff.extend_from_slice(b"MM\x00\x2A");
    tiff.extend_from_slice(&8u32.to_be_bytes());
    tiff.extend_from_slice(&1u16.to_be_bytes());
    tiff.extend_from_slice(&0x0112u16.to_be_bytes());
    tiff.extend_from_slice(&field_type.to_be_bytes());
    tiff.extend_from_slice(&count.to_be_bytes());
    tiff.extend_from_slice(&value);
    tiff.extend_from_slice(&0u32.to_be_bytes());

    let mut payload = b"Exif\x00\x00".to_vec();
    payload.extend_from_slice(&tiff);

    let mut out = Vec::with_capacity(jpeg.len() + payload.len() + 4);
    out.extend_from_slice(&jpeg[..2]);
    out.extend_from_slice(&[0xFF, 0xE1]);
    out.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
    out.extend_from_slice(&payload);
    out.extend_from_slice(&jpeg[2..]);
    out
}

/// 读取完整请求（头 + Content-Length 指定的正文）。
pub(crate) fn read_request(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let n = stream.read(&mut chunk).expect("read request failed");
        assert!(n > 0, "client closed before headers");
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let headers = String::from_utf8_lossy(&buf[..header_end]).to_lowercase();
    let content_length = headers
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok())
        .expect("request should carry content-length");

    while buf.len() < header_end + content_length {
        let n = stream.read(&mut chunk).expect("read body failed");
        assert!(n > 0, "client closed before body");
        buf.extend_from_slice(&chunk[..n]);
    }

    String::from_utf8_lossy(&buf).into_owned()
}

pub(crate) fn respond(stream: &mut TcpStream, status: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    stream.write_all(response.as_bytes()).expect("write response failed");
    stream.flush().expect("flush failed");
}

/// 只应答一次的本地上传端点，线程返回收到的请求文本。
pub(crate) fn one_shot_server(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind test server failed");
    let addr = listener.local_addr().expect("read local addr failed");

    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept failed");
        let request = read_request(&mut stream);
        respond(&mut stream, status, body);
        request
    });

    (format!("http://127.0.0.1:{}/upload", addr.port()), server)
}

/// 已完成的小画布，用于不经过流水线的状态机测试。
pub(crate) fn processed_fixture(name: &str) -> ProcessedImage {
    let size = Dimensions::new(8, 8);
    ProcessedImage {
        name: name.to_string(),
        mime_type: "image/png".to_string(),
        natural: size,
        scaled: size,
        oriented: size,
        orientation: Orientation::Normal,
        canvas: gradient(8, 8),
        complete: true,
    }
}
