use std::collections::BTreeSet;

use crate::models::{Client, ClientStatus};

#[derive(Debug, Clone, Default)]
pub struct ClientFilter {
    pub search: Option<String>,
    pub status: Option<ClientStatus>,
    pub teacher: Option<String>,
}

impl ClientFilter {
    pub fn matches(&self, client: &Client) -> bool {
        let matches_search = match self.search.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(term) => {
                let term = term.to_lowercase();
                let contains = |value: &str| value.to_lowercase().contains(&term);
                contains(&client.full_name)
                    || contains(&client.uid)
                    || client.email.as_deref().is_some_and(contains)
                    || client.telephone.as_deref().is_some_and(contains)
            }
        };
        let matches_status = self
            .status
            .as_ref()
            .is_none_or(|status| &client.status == status);
        let matches_teacher = self
            .teacher
            .as_deref()
            .is_none_or(|teacher| client.teacher.as_deref() == Some(teacher));

        matches_search && matches_status && matches_teacher
    }
}

pub fn filter_clients<'a>(clients: &'a [Client], filter: &ClientFilter) -> Vec<&'a Client> {
    clients
        .iter()
        .filter(|client| filter.matches(client))
        .collect()
}

/// Distinct, non-empty teacher names across the roster, sorted.
pub fn teachers(clients: &[Client]) -> Vec<String> {
    clients
        .iter()
        .filter_map(|client| client.teacher.as_deref())
        .filter(|teacher| !teacher.trim().is_empty())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balance::fixtures::client;

    fn roster() -> Vec<Client> {
        let mut avery = client("AL01", "Avery Lee");
        avery.email = Some("avery.lee@example.com".to_string());
        let mut jules = client("JM02", "Jules Moreno");
        jules.teacher = Some("Priya".to_string());
        jules.telephone = Some("416-555-0199".to_string());
        let mut kiara = client("KP03", "Kiara Patel");
        kiara.status = ClientStatus::Inactive;
        kiara.teacher = None;
        vec![avery, jules, kiara]
    }

    fn uids(clients: Vec<&Client>) -> Vec<&str> {
        clients.into_iter().map(|c| c.uid.as_str()).collect()
    }

    #[test]
    fn empty_filter_keeps_everyone() {
        let clients = roster();
        assert_eq!(filter_clients(&clients, &ClientFilter::default()).len(), 3);
    }

    #[test]
    fn search_covers_name_uid_email_and_phone() {
        let clients = roster();
        let search = |term: &str| {
            let filter = ClientFilter {
                search: Some(term.to_string()),
                ..Default::default()
            };
            uids(filter_clients(&clients, &filter))
        };

        assert_eq!(search("moreno"), vec!["JM02"]);
        assert_eq!(search("kp0"), vec!["KP03"]);
        assert_eq!(search("EXAMPLE.COM"), vec!["AL01"]);
        assert_eq!(search("555-0199"), vec!["JM02"]);
        assert_eq!(search("  "), vec!["AL01", "JM02", "KP03"]);
    }

    #[test]
    fn status_and_teacher_filters_combine() {
        let clients = roster();
        let filter = ClientFilter {
            status: Some(ClientStatus::Active),
            teacher: Some("Rahul".to_string()),
            ..Default::default()
        };
        assert_eq!(uids(filter_clients(&clients, &filter)), vec!["AL01"]);
    }

    #[test]
    fn teacher_list_is_distinct() {
        let mut clients = roster();
        clients.push(client("ZZ99", "Extra"));
        assert_eq!(teachers(&clients), vec!["Priya".to_string(), "Rahul".to_string()]);
    }
}
