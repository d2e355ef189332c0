/// HTTP method of a proxied route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteMethod {
    Get,
    Post,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteId {
    CreateScript,
    SendMessage,
    StartConversation,
    ClearHistory,
    GetHistory,
    SystemInfo,
    Status,
    NextSpeaker,
    UserSpeak,
    AiSpeak,
}

/// Local endpoint → backend endpoint mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProxyRoute {
    pub id: RouteId,
    pub method: RouteMethod,
    pub local_path: &'static str,
    pub backend_path: &'static str,
}

const fn route(id: RouteId, method: RouteMethod, path: &'static str) -> ProxyRoute {
    ProxyRoute {
        id,
        method,
        local_path: path,
        backend_path: path,
    }
}

pub static ROUTES: [ProxyRoute; 10] = [
    route(RouteId::CreateScript, RouteMethod::Post, "/api/create-script"),
    route(RouteId::SendMessage, RouteMethod::Post, "/api/send-message"),
    route(RouteId::StartConversation, RouteMethod::Post, "/api/start-conversation"),
    route(RouteId::ClearHistory, RouteMethod::Post, "/api/clear-history"),
    route(RouteId::GetHistory, RouteMethod::Get, "/api/get-history"),
    route(RouteId::SystemInfo, RouteMethod::Get, "/api/system-info"),
    route(RouteId::Status, RouteMethod::Get, "/api/status"),
    route(RouteId::NextSpeaker, RouteMethod::Post, "/api/next-speaker"),
    route(RouteId::UserSpeak, RouteMethod::Post, "/api/user-speak"),
    route(RouteId::AiSpeak, RouteMethod::Post, "/api/ai-speak"),
];

impl RouteId {
    pub fn route(self) -> &'static ProxyRoute {
        let index = match self {
            RouteId::CreateScript => 0,
            RouteId::SendMessage => 1,
            RouteId::StartConversation => 2,
            RouteId::ClearHistory => 3,
            RouteId::GetHistory => 4,
            RouteId::SystemInfo => 5,
            RouteId::Status => 6,
            RouteId::NextSpeaker => 7,
            RouteId::UserSpeak => 8,
            RouteId::AiSpeak => 9,
        };
        &ROUTES[index]
    }
}
