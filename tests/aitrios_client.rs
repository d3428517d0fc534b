use anyhow::Result;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use zeroize::Zeroizing;

use aitrios_monitor::remote::{
    AitriosClient, ClientCredentials, DeviceService, RemoteUnavailable, TokenProvider,
};
use aitrios_monitor::{ConnectionState, OperationState};

const DEVICE: &str = "dev-1";

#[derive(Clone, Debug)]
struct Recorded {
    method: String,
    target: String,
    headers: String,
    body: String,
}

impl Recorded {
    fn path(&self) -> &str {
        self.target.split('?').next().unwrap_or("")
    }
}

struct FakeConsole {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl FakeConsole {
    fn start(token_status: u16) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let addr = listener.local_addr()?;
        let requests = Arc::new(Mutex::new(Vec::new()));
        let log = requests.clone();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { break };
                if let Ok(request) = read_request(&mut stream) {
                    let (status, body) = route(&request, token_status);
                    log.lock().unwrap().push(request);
                    let _ = write_response(&mut stream, status, &body);
                }
            }
        });
        Ok(Self { addr, requests })
    }

    fn base_url(&self) -> String {
        format!("http://{}/api/v1", self.addr)
    }

    fn token_url(&self) -> String {
        format!("http://{}/oauth2/token", self.addr)
    }

    fn client(&self) -> AitriosClient {
        let credentials = ClientCredentials {
            client_id: "client".into(),
            client_secret: Zeroizing::new("s3cret".into()),
        };
        let timeout = Duration::from_secs(5);
        let tokens = TokenProvider::new(self.token_url(), credentials, timeout);
        AitriosClient::new(&self.base_url(), DEVICE, Arc::new(tokens), timeout)
    }

    fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }
}

fn read_request(stream: &mut TcpStream) -> Result<Recorded> {
    stream.set_read_timeout(Some(Duration::from_secs(5)))?;
    let mut raw = Vec::new();
    let mut chunk = [0u8; 1024];
    let header_end = loop {
        let n = stream.read(&mut chunk)?;
        if n == 0 {
            anyhow::bail!("connection closed before headers");
        }
        raw.extend_from_slice(&chunk[..n]);
        if let Some(pos) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };
    let head = String::from_utf8_lossy(&raw[..header_end]).to_string();
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    while raw.len() < header_end + content_length {
        let n = stream.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        raw.extend_from_slice(&chunk[..n]);
    }

    let mut request_line = head.lines().next().unwrap_or("").split_whitespace();
    Ok(Recorded {
        method: request_line.next().unwrap_or("").to_string(),
        target: request_line.next().unwrap_or("").to_string(),
        headers: head.to_lowercase(),
        body: String::from_utf8_lossy(&raw[header_end..]).to_string(),
    })
}

fn write_response(stream: &mut TcpStream, status: u16, body: &str) -> Result<()> {
    let reason = if status == 200 { "OK" } else { "Error" };
    write!(
        stream,
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        reason,
        body.len(),
        body
    )?;
    stream.flush()?;
    Ok(())
}

fn route(request: &Recorded, token_status: u16) -> (u16, String) {
    let device = format!("/api/v1/devices/{}", DEVICE);
    let path = request.path();
    match (request.method.as_str(), path) {
        ("POST", "/oauth2/token") => {
            if token_status == 200 {
                (200, r#"{"access_token":"tok-1","expires_in":3600,"token_type":"Bearer"}"#.into())
            } else {
                (token_status, r#"{"error":"invalid_client"}"#.into())
            }
        }
        ("GET", "/api/v1/devices/images/directories") => (
            200,
            r#"[{"group_id":"g","devices":[{"device_id":"dev-1","Image":["20240101000000","20240102000000"]}]}]"#
                .into(),
        ),
        ("GET", p) if p == device => (
            200,
            r#"{"device_id":"dev-1","connectionState":"Connected","state":{"Status":{"ApplicationProcessor":"StreamingBoth"}}}"#
                .into(),
        ),
        ("GET", p) if p == format!("{}/images/directories/20240102000000", device) => (
            200,
            r#"{"total_image_count":1,"images":[{"name":"20240102T101010.jpg","contents":"AAAA"}]}"#.into(),
        ),
        ("GET", p) if p == format!("{}/images/directories/a%2Fb%3Fc", device) => (
            200,
            r#"{"images":[{"name":"20240103T000000.jpg","contents":"AAAA"}]}"#.into(),
        ),
        ("GET", p) if p == format!("{}/images/directories/empty", device) => {
            (200, r#"{"images":[]}"#.into())
        }
        ("GET", p) if p == format!("{}/inferenceresults", device) => (
            200,
            r#"[{"inference_result":{"Inferences":[{"T":"20240102T101010","O":"AQID"}]}},
                {"inference_result":{"Inferences":[{"T":"20240102T100000"}]}}]"#
                .into(),
        ),
        ("POST", p) if p == format!("{}/inferenceresults/collectstart", device) => {
            (200, r#"{"result":"SUCCESS","message":"started"}"#.into())
        }
        ("POST", p) if p == format!("{}/inferenceresults/collectstop", device) => {
            (500, r#"{"result":"ERROR","message":"internal"}"#.into())
        }
        _ => (404, r#"{"message":"not found"}"#.into()),
    }
}

#[test]
fn token_is_requested_once_and_sent_as_bearer() -> Result<()> {
    let console = FakeConsole::start(200)?;
    let client = console.client();

    client.device_state()?;
    client.image_directories()?;
    client.inference_results(3)?;

    let requests = console.requests();
    let token_requests: Vec<_> = requests.iter().filter(|r| r.path() == "/oauth2/token").collect();
    assert_eq!(token_requests.len(), 1);
    let expected_basic = format!("authorization: basic {}", BASE64.encode("client:s3cret")).to_lowercase();
    assert!(token_requests[0].headers.contains(&expected_basic));
    assert!(token_requests[0].body.contains("grant_type=client_credentials"));
    assert!(token_requests[0].body.contains("scope=system"));

    let api_requests: Vec<_> = requests.iter().filter(|r| r.path() != "/oauth2/token").collect();
    assert_eq!(api_requests.len(), 3);
    for request in api_requests {
        assert!(request.headers.contains("authorization: bearer tok-1"), "{:?}", request);
    }
    Ok(())
}

#[test]
fn parses_console_responses() -> Result<()> {
    let console = FakeConsole::start(200)?;
    let client = console.client();

    assert_eq!(
        client.device_state()?,
        (ConnectionState::Connected, OperationState::StreamingBoth)
    );

    let directories = client.image_directories()?;
    assert_eq!(directories, vec!["20240101000000", "20240102000000"]);

    let image = client.latest_image(directories.last().unwrap())?.expect("image");
    assert_eq!(image.name, "20240102T101010.jpg");
    assert!(client.latest_image("empty")?.is_none());

    let inferences = client.inference_results(3)?;
    assert_eq!(inferences.len(), 2);
    assert_eq!(inferences[0].timestamp.as_deref(), Some("20240102T101010"));
    assert_eq!(inferences[0].payload.as_deref(), Some("AQID"));
    assert!(inferences[1].payload.is_none());

    let query = console
        .requests()
        .into_iter()
        .find(|r| r.path().ends_with("/inferenceresults"))
        .map(|r| r.target)
        .unwrap();
    assert!(query.contains("NumberOfInferenceresults=3"));
    assert!(query.contains("raw=1"));
    assert!(query.contains("order_by=DESC"));
    Ok(())
}

#[test]
fn commands_report_outcome_and_http_errors() -> Result<()> {
    let console = FakeConsole::start(200)?;
    let client = console.client();

    let started = client.start_inference()?;
    assert!(started.is_success());
    assert_eq!(started.message, "started");

    let err = client.stop_inference().unwrap_err();
    let remote = err.downcast_ref::<RemoteUnavailable>().expect("typed error");
    assert!(remote.endpoint.ends_with("/collectstop"));
    assert!(remote.detail.contains("500"));
    Ok(())
}

#[test]
fn rejected_token_request_surfaces_as_error() -> Result<()> {
    let console = FakeConsole::start(401)?;
    let client = console.client();

    let err = client.device_state().unwrap_err();
    let chain = format!("{:#}", err);
    assert!(chain.contains("401"), "{}", chain);
    assert!(console
        .requests()
        .iter()
        .all(|r| r.path() == "/oauth2/token"));
    Ok(())
}

#[test]
fn directory_names_are_encoded_as_one_path_segment() -> Result<()> {
    let console = FakeConsole::start(200)?;
    let client = console.client();

    let image = client.latest_image("a/b?c")?.expect("image");
    assert_eq!(image.name, "20240103T000000.jpg");

    let before = console.requests().len();
    for name in ["", ".", ".."] {
        assert!(client.latest_image(name).is_err(), "{:?}", name);
    }
    assert_eq!(console.requests().len(), before);

    let target = console
        .requests()
        .into_iter()
        .find(|r| r.path().contains("a%2Fb"))
        .map(|r| r.target)
        .unwrap();
    assert!(target.contains("number_of_images=1"));
    Ok(())
}
