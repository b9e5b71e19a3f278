//! nom parsers for the values the routing core reads
//!
//! Covers SIP URIs (RFC 3261 section 19.1), method names and the token
//! valued `Subscription-State` and `Event` headers with their generic
//! parameters. Parsers work on bytes, the way the rest of the rvoip parsers
//! do.

use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_while, take_while1},
    character::complete::digit1,
    combinator::{all_consuming, map, map_res, opt, recognize},
    multi::many0,
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};

use super::{EventHeader, Method, SipUri, SubscriptionState};

pub type ParseResult<'a, O> = IResult<&'a [u8], O>;

fn text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn is_token_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || b"-.!%*_+`'~".contains(&c)
}

fn is_unreserved(c: u8) -> bool {
    c.is_ascii_alphanumeric() || b"-_.!~*'()".contains(&c)
}

fn is_user_char(c: u8) -> bool {
    is_unreserved(c) || b"%&=+$,?/".contains(&c)
}

fn is_hostname_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'-' || c == b'.'
}

fn is_ipv6_char(c: u8) -> bool {
    c.is_ascii_hexdigit() || c == b':' || c == b'.'
}

fn is_param_char(c: u8) -> bool {
    is_unreserved(c) || b"%[]/:&+$".contains(&c)
}

fn sws(input: &[u8]) -> ParseResult<&[u8]> {
    take_while(|c: u8| c == b' ' || c == b'\t')(input)
}

fn semi(input: &[u8]) -> ParseResult<&[u8]> {
    recognize(tuple((sws, tag(b";"), sws)))(input)
}

fn equal(input: &[u8]) -> ParseResult<&[u8]> {
    recognize(tuple((sws, tag(b"="), sws)))(input)
}

pub fn token(input: &[u8]) -> ParseResult<String> {
    map(take_while1(is_token_char), text)(input)
}

// Escapes are not unfolded; routing never looks inside quoted values
fn quoted_string(input: &[u8]) -> ParseResult<String> {
    map(delimited(tag(b"\""), take_while(|c: u8| c != b'"'), tag(b"\"")), text)(input)
}

/// `;name[=value]` header parameter
fn generic_param(input: &[u8]) -> ParseResult<(String, Option<String>)> {
    preceded(semi, pair(token, opt(preceded(equal, alt((token, quoted_string))))))(input)
}

fn scheme(input: &[u8]) -> ParseResult<String> {
    map(alt((tag_no_case(b"sips"), tag_no_case(b"sip"))), |s: &[u8]| {
        text(s).to_ascii_lowercase()
    })(input)
}

fn user(input: &[u8]) -> ParseResult<String> {
    terminated(map(take_while1(is_user_char), text), tag(b"@"))(input)
}

fn host(input: &[u8]) -> ParseResult<String> {
    map(
        alt((
            delimited(tag(b"["), take_while1(is_ipv6_char), tag(b"]")),
            take_while1(is_hostname_char),
        )),
        text,
    )(input)
}

fn port(input: &[u8]) -> ParseResult<u16> {
    preceded(tag(b":"), map_res(digit1, |digits: &[u8]| text(digits).parse::<u16>()))(input)
}

fn uri_param(input: &[u8]) -> ParseResult<(String, Option<String>)> {
    preceded(
        tag(b";"),
        pair(
            map(take_while1(is_param_char), text),
            opt(preceded(tag(b"="), map(take_while1(is_param_char), text))),
        ),
    )(input)
}

/// `sip:` or `sips:` URI without headers
pub fn sip_uri(input: &[u8]) -> ParseResult<SipUri> {
    map(
        tuple((
            terminated(scheme, tag(b":")),
            opt(user),
            host,
            opt(port),
            many0(uri_param),
        )),
        |(scheme, user, host, port, params)| SipUri { scheme, user, host, port, params },
    )(input)
}

/// A SIP URI, bare or in angle brackets as in a Route header
pub fn route_uri(input: &[u8]) -> ParseResult<SipUri> {
    alt((delimited(tag(b"<"), sip_uri, tag(b">")), sip_uri))(input)
}

pub fn method(input: &[u8]) -> ParseResult<Method> {
    map(take_while1(is_token_char), |name: &[u8]| {
        match name.to_ascii_uppercase().as_slice() {
            b"INVITE" => Method::Invite,
            b"ACK" => Method::Ack,
            b"BYE" => Method::Bye,
            b"CANCEL" => Method::Cancel,
            b"PRACK" => Method::Prack,
            b"NOTIFY" => Method::Notify,
            b"SUBSCRIBE" => Method::Subscribe,
            b"INFO" => Method::Info,
            b"UPDATE" => Method::Update,
            b"REFER" => Method::Refer,
            b"MESSAGE" => Method::Message,
            b"OPTIONS" => Method::Options,
            b"PUBLISH" => Method::Publish,
            b"REGISTER" => Method::Register,
            _ => Method::Extension(text(name)),
        }
    })(input)
}

/// `substate-value *( SEMI subexp-params )`
pub fn subscription_state(input: &[u8]) -> ParseResult<SubscriptionState> {
    map(terminated(token, many0(generic_param)), |value| {
        if value.eq_ignore_ascii_case("active") {
            SubscriptionState::Active
        } else if value.eq_ignore_ascii_case("pending") {
            SubscriptionState::Pending
        } else if value.eq_ignore_ascii_case("terminated") {
            SubscriptionState::Terminated
        } else {
            SubscriptionState::Extension(value)
        }
    })(input)
}

/// `event-type *( SEMI event-param )`, keeping only the `id` parameter
pub fn event(input: &[u8]) -> ParseResult<EventHeader> {
    map(pair(token, many0(generic_param)), |(package, params)| EventHeader {
        package: package.to_ascii_lowercase(),
        id: params
            .into_iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("id"))
            .and_then(|(_, value)| value),
    })(input)
}

/// Run `parser` over the whole of `input`, surrounding whitespace aside
///
/// On failure returns the byte offset, within the trimmed input, where
/// parsing stopped.
pub(crate) fn parse_all<'a, O>(
    input: &'a str,
    parser: impl FnMut(&'a [u8]) -> ParseResult<'a, O>,
) -> Result<O, usize> {
    let trimmed = input.trim().as_bytes();
    match all_consuming(parser)(trimmed) {
        Ok((_, value)) => Ok(value),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(trimmed.len() - e.input.len()),
        Err(nom::Err::Incomplete(_)) => Err(trimmed.len()),
    }
}
