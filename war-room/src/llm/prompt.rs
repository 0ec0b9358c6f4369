// Prompt templates for pick commentary.
//
// The prompt carries pre-formatted numbers (stats, ADP, the owner's roster
// totals) so the model spends its words on value and fit, not arithmetic.

use super::commentary::CommentaryRequest;

/// Static system prompt for every commentary call.
pub fn system_prompt() -> String {
    "You are the color commentator for a live fantasy baseball snake draft.\n\
     Categories: R, HR, RBI, SB, OBP (hitting) | K, QS, ERA, WHIP, SV+HD (pitching).\n\
     Tone: witty and sharp, never mean-spirited. Plain text only, no markdown or HTML."
        .to_string()
}

/// User prompt reacting to a single resolved pick.
pub fn commentary_prompt(req: &CommentaryRequest) -> String {
    let item = &req.item;
    let adp = item
        .rank
        .map(|r| format!("{r:.1}"))
        .unwrap_or_else(|| "N/A".to_string());

    let t = &req.owner_totals;
    let team_stats = format!(
        "{} hitters: {:.0} R, {:.0} HR, {:.0} RBI, {:.0} SB, {:.3} OBP | \
         {} pitchers: {:.0} K, {:.0} QS, {:.2} ERA, {:.3} WHIP, {:.0} SV+HD",
        t.hitters,
        t.hitting.r,
        t.hitting.hr,
        t.hitting.rbi,
        t.hitting.sb,
        t.hitting.obp,
        t.pitchers,
        t.pitching.k,
        t.pitching.qs,
        t.pitching.era,
        t.pitching.whip,
        t.pitching.sv_hd,
    );

    let roster = if req.owner_roster.is_empty() {
        "(first pick)".to_string()
    } else {
        req.owner_roster.join(", ")
    };

    format!(
        "Action: {owner} picked {name} (Pick #{pick}, round {round}).\n\
         \n\
         PLAYER\n\
         - Position: {position}\n\
         - Team: {team}\n\
         - ADP: {adp}\n\
         - Projection: {stats}\n\
         \n\
         OWNER\n\
         - Roster before this pick: {roster}\n\
         - Current team projections: {team_stats}\n\
         \n\
         TASK\n\
         Write a reaction of at most 150 words.\n\
         - Was this a reach or a steal relative to ADP?\n\
         - Does the player fill a need for {owner}?\n\
         - Keep it entertaining and insightful.",
        owner = req.owner,
        name = item.name,
        pick = req.pick_number,
        round = req.round,
        position = item.position,
        team = item.team,
        stats = item.stat_summary(),
    )
}
